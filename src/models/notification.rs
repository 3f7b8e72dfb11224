use serde::{Deserialize, Serialize};

/// Template used for the welcome email carrying the activation token.
pub const USER_WELCOME_TEMPLATE: &str = "user_welcome";

/// Command placed on the mail queue by the registration path.
///
/// `template_data` stays opaque JSON on the wire; the mail sender decides how
/// to interpret it based on `template_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationCommand {
    pub to: String,
    pub template_name: String,
    pub template_data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWelcomeData {
    pub name: String,
    pub token: String,
}

impl NotificationCommand {
    pub fn user_welcome(to: &str, data: UserWelcomeData) -> Result<Self, serde_json::Error> {
        Ok(Self {
            to: to.to_string(),
            template_name: USER_WELCOME_TEMPLATE.to_string(),
            template_data: serde_json::to_value(data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_welcome_wire_format() {
        let command = NotificationCommand::user_welcome(
            "ada@example.com",
            UserWelcomeData {
                name: "Ada".to_string(),
                token: "00ff".to_string(),
            },
        )
        .unwrap();

        let wire = serde_json::to_value(&command).unwrap();
        assert_eq!(
            wire,
            json!({
                "to": "ada@example.com",
                "template_name": "user_welcome",
                "template_data": { "name": "Ada", "token": "00ff" }
            })
        );
    }
}
