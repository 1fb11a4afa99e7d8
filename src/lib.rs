pub mod app_state;
pub mod configuration;
pub mod domain;
pub mod email_client;
pub mod request_id;
pub mod routes;
pub mod startup;
pub mod telemetry;
pub mod welcome_email_worker;
