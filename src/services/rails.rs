//! Asynchronous rails: payer instructions, pending references, and the signed
//! notification that completes them.

use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::RailSettings;
use crate::domain::{PayerData, PaymentLink, PaymentMethod, RailSignal};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-rail-signature";
const REFERENCE_PREFIX: &str = "rail_";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rail", rename_all = "snake_case")]
pub enum RailInstructions {
    Bank {
        account_name: String,
        account_number: String,
        bank_name: String,
        amount: BigDecimal,
        currency: String,
        reference: String,
    },
    Ussd {
        dial_code: String,
        amount: BigDecimal,
        currency: String,
        reference: String,
    },
    Crypto {
        address: String,
        network: String,
        amount: BigDecimal,
        currency: String,
        reference: String,
    },
}

/// A pending reference encodes its rail, e.g. `rail_ussd_3f2a...`.
pub fn new_rail_reference(method: PaymentMethod) -> String {
    format!(
        "{}{}_{}",
        REFERENCE_PREFIX,
        method.as_str(),
        Uuid::new_v4().simple()
    )
}

pub fn rail_of_reference(reference: &str) -> Option<PaymentMethod> {
    let rest = reference.strip_prefix(REFERENCE_PREFIX)?;
    let (rail, id) = rest.split_once('_')?;
    if id.is_empty() {
        return None;
    }
    PaymentMethod::parse(rail).filter(PaymentMethod::is_async)
}

fn not_offered(method: PaymentMethod) -> AppError {
    AppError::Validation(format!("payment_method: {} is not offered", method))
}

pub fn instructions_for(
    settings: &RailSettings,
    method: PaymentMethod,
    link: &PaymentLink,
    reference: &str,
) -> Result<RailInstructions, AppError> {
    let amount = link.amount.clone();
    let currency = link.currency.clone();
    let reference = reference.to_string();

    match method {
        PaymentMethod::Bank => {
            let (account_name, account_number, bank_name) = match (
                &settings.bank_account_name,
                &settings.bank_account_number,
                &settings.bank_name,
            ) {
                (Some(name), Some(number), Some(bank)) => {
                    (name.clone(), number.clone(), bank.clone())
                }
                _ => return Err(not_offered(method)),
            };
            Ok(RailInstructions::Bank {
                account_name,
                account_number,
                bank_name,
                amount,
                currency,
                reference,
            })
        }
        PaymentMethod::Ussd => {
            let whole = amount.with_scale(0);
            let shown = if whole == amount {
                whole.to_string()
            } else {
                amount.with_scale(2).to_string()
            };
            let dial_code = settings
                .ussd_code_template
                .replace("{amount}", &shown)
                .replace("{reference}", &reference);
            Ok(RailInstructions::Ussd {
                dial_code,
                amount,
                currency,
                reference,
            })
        }
        PaymentMethod::Crypto => {
            let (address, network) =
                match (&settings.crypto_deposit_address, &settings.crypto_network) {
                    (Some(address), Some(network)) => (address.clone(), network.clone()),
                    _ => return Err(not_offered(method)),
                };
            Ok(RailInstructions::Crypto {
                address,
                network,
                amount,
                currency,
                reference,
            })
        }
        PaymentMethod::Card => Err(AppError::InvalidTransition(
            "card payments use a card session".to_string(),
        )),
    }
}

/// Body of `POST /webhooks/rails`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailNotification {
    pub reference: String,
    pub short_code: String,
    pub status: RailSignal,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(default)]
    pub payer: PayerData,
}

/// Hex HMAC-SHA256 of `body`, as a rail backend would send it.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature header against `body`.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewPaymentLink;
    use chrono::Utc;
    use std::str::FromStr;

    fn settings() -> RailSettings {
        RailSettings {
            bank_account_name: Some("Acme Stores".to_string()),
            bank_account_number: Some("0123456789".to_string()),
            bank_name: Some("First Bank".to_string()),
            ussd_code_template: "*737*000*{amount}*{reference}#".to_string(),
            crypto_deposit_address: None,
            crypto_network: None,
        }
    }

    fn link() -> PaymentLink {
        PaymentLink::new(
            NewPaymentLink {
                title: "Ticket".to_string(),
                description: None,
                amount: BigDecimal::from_str("2500.00").unwrap(),
                currency: "NGN".to_string(),
                expires_at: None,
                max_uses: None,
                collect_phone: false,
                collect_shipping: false,
                redirect_url: None,
                success_message: None,
            },
            "tkt00001".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn reference_round_trips_rail() {
        let reference = new_rail_reference(PaymentMethod::Ussd);
        assert!(reference.starts_with("rail_ussd_"));
        assert_eq!(rail_of_reference(&reference), Some(PaymentMethod::Ussd));
        assert_eq!(rail_of_reference("rail_card_abc"), None);
        assert_eq!(rail_of_reference("pi_123"), None);
        assert_eq!(rail_of_reference("rail_bank_"), None);
    }

    #[test]
    fn bank_instructions_carry_account_and_reference() {
        let instructions =
            instructions_for(&settings(), PaymentMethod::Bank, &link(), "rail_bank_1").unwrap();
        match instructions {
            RailInstructions::Bank {
                account_number,
                reference,
                ..
            } => {
                assert_eq!(account_number, "0123456789");
                assert_eq!(reference, "rail_bank_1");
            }
            other => panic!("unexpected instructions: {:?}", other),
        }
    }

    #[test]
    fn ussd_code_embeds_amount_and_reference() {
        let instructions =
            instructions_for(&settings(), PaymentMethod::Ussd, &link(), "rail_ussd_9").unwrap();
        let json = serde_json::to_value(&instructions).unwrap();
        assert_eq!(json["rail"], "ussd");
        assert_eq!(json["dial_code"], "*737*000*2500*rail_ussd_9#");
    }

    #[test]
    fn unconfigured_rail_is_not_offered() {
        let err = instructions_for(&settings(), PaymentMethod::Crypto, &link(), "rail_crypto_1")
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn verifies_signatures_in_constant_time() {
        let body = br#"{"reference":"rail_bank_1"}"#;
        let signature = sign("whsec", body).unwrap();

        assert!(verify_signature("whsec", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("whsec", b"tampered", &signature));
        assert!(!verify_signature("whsec", body, "not-hex"));
    }
}
