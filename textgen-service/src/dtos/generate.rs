use serde::{Deserialize, Serialize};
use validator::Validate;

pub const WELCOME_MESSAGE: &str = "Welcome to the Text Generation API!";

#[derive(Debug, Serialize)]
pub struct WelcomeResponse {
    pub message: String,
}

impl Default for WelcomeResponse {
    fn default() -> Self {
        Self {
            message: WELCOME_MESSAGE.to_string(),
        }
    }
}

/// Query string of `GET /generate`.
///
/// `text` is optional at the serde level so a missing parameter reaches
/// validation instead of failing inside the extractor.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateParams {
    #[validate(
        required(message = "text is required"),
        length(min = 1, message = "text must not be empty")
    )]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_text_fails_validation() {
        let params = GenerateParams { text: None };
        assert!(params.validate().is_err());
    }

    #[test]
    fn empty_text_fails_validation() {
        let params = GenerateParams {
            text: Some(String::new()),
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn present_text_passes_validation() {
        let params = GenerateParams {
            text: Some("Explain quantum computing".to_string()),
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn responses_serialize_with_expected_keys() {
        let welcome = serde_json::to_value(WelcomeResponse::default()).unwrap();
        assert_eq!(welcome["message"], WELCOME_MESSAGE);

        let generated = serde_json::to_value(GenerateResponse {
            output: "42".to_string(),
        })
        .unwrap();
        assert_eq!(generated["output"], "42");
    }
}
