mod subscriber;
mod subscriber_email;
mod subscription_status;

pub use subscriber::Subscriber;
pub use subscriber_email::SubscriberEmail;
pub use subscription_status::SubscriptionStatus;
