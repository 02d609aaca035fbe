use crate::gate::identity::Identity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("You need to contact your administrator to get an OTP token for those commands.")]
    UnknownIdentity(Identity),
    #[error("OTP expired, send an OTP directly to the bot to unlock this command.")]
    StaleAuthentication(Identity),
    #[error("Your OTP secret was locked after too many failed attempts, contact your administrator.")]
    LockedOut(Identity),
    #[error("{0} is not in the list of OTPed commands")]
    NotFound(String),
    #[error("not an OTP code")]
    MalformedOtpInput,
    #[error("OTP verification failed.")]
    VerificationFailure(Identity),
    #[error("You're not allowed to access this command.")]
    PermissionDenied(Identity),
    #[error("secret provisioning failed: {0}")]
    Provisioning(String),
    #[error("state persistence failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GateError {
    /// Identity the error refers to, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::UnknownIdentity(id)
            | Self::StaleAuthentication(id)
            | Self::LockedOut(id)
            | Self::VerificationFailure(id)
            | Self::PermissionDenied(id) => Some(id),
            Self::NotFound(_)
            | Self::MalformedOtpInput
            | Self::Provisioning(_)
            | Self::Io(_)
            | Self::Serde(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_are_actionable() {
        let alice = Identity::from("alice");
        assert!(GateError::UnknownIdentity(alice.clone())
            .to_string()
            .contains("contact your administrator"));
        assert!(GateError::StaleAuthentication(alice.clone())
            .to_string()
            .contains("send an OTP"));
        assert_eq!(
            GateError::NotFound("deploy".to_string()).to_string(),
            "deploy is not in the list of OTPed commands"
        );
        assert_eq!(
            GateError::LockedOut(alice.clone()).identity(),
            Some(&alice)
        );
        assert!(GateError::MalformedOtpInput.identity().is_none());
    }
}
