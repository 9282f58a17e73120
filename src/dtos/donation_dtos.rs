use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::common::Currency;
use crate::models::donation::DonationResponse;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[validate(length(min = 1, message = "Campaign ID is required"))]
    pub campaign_id: String,

    #[validate(range(min = 1.0, max = 1000000.0, message = "Donation amount must be between 1 and 1000000"))]
    pub amount: f64,

    #[serde(default)]
    pub currency: Currency,

    #[validate(email(message = "A valid donor email is required"))]
    pub donor_email: String,

    #[validate(length(min = 1, max = 100, message = "Donor name is required"))]
    pub donor_name: String,

    #[validate(length(max = 500, message = "Message cannot be more than 500 characters"))]
    pub message: Option<String>,

    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDonationRequest {
    #[validate(length(min = 1, message = "Payment intent ID is required"))]
    pub payment_intent_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub success: bool,
    pub client_secret: String,
    pub payment_intent_id: String,
    pub donation_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmDonationResponse {
    pub success: bool,
    pub message: &'static str,
    pub already_confirmed: bool,
    pub donation: DonationResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: f64) -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            campaign_id: "65f1c0ffee0000000000abcd".into(),
            amount,
            currency: Currency::Usd,
            donor_email: "donor@example.org".into(),
            donor_name: "Dee".into(),
            message: None,
            is_anonymous: false,
        }
    }

    #[test]
    fn amount_bounds() {
        assert!(request(1.0).validate().is_ok());
        assert!(request(1_000_000.0).validate().is_ok());
        assert!(request(0.5).validate().is_err());
        assert!(request(1_000_000.01).validate().is_err());
    }

    #[test]
    fn currency_defaults_to_usd() {
        let parsed: CreatePaymentIntentRequest = serde_json::from_str(
            r#"{"campaignId":"x","amount":10,"donorEmail":"a@b.co","donorName":"A"}"#,
        )
        .unwrap();
        assert_eq!(parsed.currency, Currency::Usd);
        assert!(!parsed.is_anonymous);
    }
}
