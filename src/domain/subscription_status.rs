#[derive(Debug, PartialEq)]
pub enum SubscriptionStatus {
    Pending,
    Confirmed,
}

impl AsRef<str> for SubscriptionStatus {
    fn as_ref(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Confirmed => "confirmed",
        }
    }
}

impl TryFrom<String> for SubscriptionStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "pending" => Ok(SubscriptionStatus::Pending),
            "confirmed" => Ok(SubscriptionStatus::Confirmed),
            other => Err(format!(
                "`{other}` is not a valid variant of SubscriptionStatus",
            )),
        }
    }
}
