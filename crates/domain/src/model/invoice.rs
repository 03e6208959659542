use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use super::{
    char_len, is_web_url, AmountError, InvoiceId, NanoAddress, NanoAddressError, PaymentId, Raw,
    ServiceId,
};

/// Smallest price (in XNO) an invoice may request.
pub const INVOICE_MINIMUM_PRICE: f64 = 0.00001;
/// Largest price (in XNO) an invoice may request.
pub const INVOICE_MAXIMUM_PRICE: f64 = 1_000_000.0;

pub const INVOICE_TITLE_MIN: usize = 2;
pub const INVOICE_TITLE_MAX: usize = 40;
pub const INVOICE_DESCRIPTION_MAX: usize = 512;
pub const INVOICE_REDIRECT_URL_MAX: usize = 512;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Processing,
    Paid,
    Expired,
    Refunded,
    Canceled,
    Error,
    PaidPartial,
    RefundedPartial,
}

impl InvoiceStatus {
    /// Statuses the watcher keeps polling for incoming funds.
    pub const WATCHABLE: [InvoiceStatus; 2] = [InvoiceStatus::Pending, InvoiceStatus::Processing];

    /// Statuses an operator refund may start from.
    pub const REFUNDABLE: [InvoiceStatus; 3] = [
        InvoiceStatus::Paid,
        InvoiceStatus::PaidPartial,
        InvoiceStatus::RefundedPartial,
    ];

    pub fn accepts_payments(self) -> bool {
        Self::WATCHABLE.contains(&self)
    }

    /// Terminal for the watcher: no more payments are matched and no more
    /// automatic transitions happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvoiceStatus::Paid
                | InvoiceStatus::Expired
                | InvoiceStatus::Refunded
                | InvoiceStatus::Canceled
                | InvoiceStatus::Error
        )
    }

    pub fn is_refundable(self) -> bool {
        Self::REFUNDABLE.contains(&self)
    }

    pub fn is_cancelable(self) -> bool {
        self == InvoiceStatus::Pending
    }
}

/// Status once the invoice has accumulated `received` against `price`.
pub fn status_after_payment(price: Raw, received: Raw) -> InvoiceStatus {
    if received >= price {
        InvoiceStatus::Paid
    } else if received.is_zero() {
        InvoiceStatus::Pending
    } else {
        InvoiceStatus::Processing
    }
}

/// Status for an invoice whose payment window closed.
pub fn status_after_expiry(received: Raw) -> InvoiceStatus {
    if received.is_zero() {
        InvoiceStatus::Expired
    } else {
        InvoiceStatus::PaidPartial
    }
}

/// Status after refunds total `refunded` out of `received`.
pub fn status_after_refund(received: Raw, refunded: Raw) -> InvoiceStatus {
    if refunded >= received {
        InvoiceStatus::Refunded
    } else {
        InvoiceStatus::RefundedPartial
    }
}

/// Strict invoice-create payload: unknown fields are rejected at
/// deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceCreate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    pub recipient_address: String,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// Invoice input that passed validation, with typed price and address.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidInvoiceCreate {
    pub title: String,
    pub description: Option<String>,
    pub price: Raw,
    pub recipient_address: NanoAddress,
    pub metadata: Option<Map<String, Value>>,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvoiceValidationError {
    #[error("title must be between {INVOICE_TITLE_MIN} and {INVOICE_TITLE_MAX} characters")]
    TitleLength,
    #[error("description must be at most {INVOICE_DESCRIPTION_MAX} characters")]
    DescriptionTooLong,
    #[error("price must be greater than or equal to {INVOICE_MINIMUM_PRICE}")]
    PriceBelowMinimum,
    #[error("price must be less than or equal to {INVOICE_MAXIMUM_PRICE}")]
    PriceAboveMaximum,
    #[error("invalid price: {0}")]
    Price(#[from] AmountError),
    #[error("invalid recipient_address: {0}")]
    RecipientAddress(#[from] NanoAddressError),
    #[error("redirect_url must be an http(s) URL of at most {INVOICE_REDIRECT_URL_MAX} characters")]
    RedirectUrl,
    #[error("limit must be between 1 and {INVOICE_PAGE_MAX}")]
    PageLimit,
}

impl InvoiceCreate {
    pub fn validate(self) -> Result<ValidInvoiceCreate, InvoiceValidationError> {
        let title_len = char_len(&self.title);
        if !(INVOICE_TITLE_MIN..=INVOICE_TITLE_MAX).contains(&title_len) {
            return Err(InvoiceValidationError::TitleLength);
        }

        if let Some(description) = &self.description {
            if char_len(description) > INVOICE_DESCRIPTION_MAX {
                return Err(InvoiceValidationError::DescriptionTooLong);
            }
        }

        if self.price.is_nan() || self.price < INVOICE_MINIMUM_PRICE {
            return Err(InvoiceValidationError::PriceBelowMinimum);
        }
        if self.price > INVOICE_MAXIMUM_PRICE {
            return Err(InvoiceValidationError::PriceAboveMaximum);
        }
        let price = Raw::from_xno(self.price)?;

        let recipient_address = NanoAddress::parse(&self.recipient_address)?;

        if let Some(url) = &self.redirect_url {
            if !is_web_url(url, INVOICE_REDIRECT_URL_MAX) {
                return Err(InvoiceValidationError::RedirectUrl);
            }
        }

        Ok(ValidInvoiceCreate {
            title: self.title,
            description: self.description,
            price,
            recipient_address,
            metadata: self.metadata,
            redirect_url: self.redirect_url,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub id: InvoiceId,
    pub service_id: ServiceId,
    pub title: String,
    pub description: Option<String>,
    pub price: Raw,
    pub recipient_address: String,
    pub metadata: Option<Map<String, Value>>,
    pub redirect_url: Option<String>,
    pub pay_address: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub service_id: ServiceId,
    pub title: String,
    pub description: Option<String>,
    pub price: Raw,
    pub recipient_address: String,
    pub metadata: Option<Map<String, Value>>,
    pub redirect_url: Option<String>,
    pub currency: String,
    pub status: InvoiceStatus,
    pub pay_address: String,
    pub received_amount: Raw,
    pub refunded_amount: Raw,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub payments: Vec<PaymentRecord>,
}

impl InvoiceRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Amount still available for refunds.
    pub fn refundable_amount(&self) -> Raw {
        self.received_amount.saturating_sub(self.refunded_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub from: String,
    pub to: String,
    pub hash: String,
    pub amount: Raw,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub invoice_id: InvoiceId,
    pub from: String,
    pub to: String,
    pub hash: String,
    pub amount: Raw,
    pub timestamp: DateTime<Utc>,
}

/// Invoice state after a status-changing write, with the status it left.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub invoice: InvoiceRecord,
    pub previous_status: InvoiceStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.invoice.status != self.previous_status
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
    Applied(StatusChange),
    NotFound,
    NotRefundable(InvoiceStatus),
    ExceedsAvailable { available: Raw },
}

pub const INVOICE_PAGE_DEFAULT: u64 = 10;
pub const INVOICE_PAGE_MAX: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceOrderBy {
    /// Sorts by invoice title.
    Name,
    #[default]
    CreatedAt,
}

/// Raw pagination query as sent by the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoicePagination {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order: Option<SortOrder>,
    pub order_by: Option<InvoiceOrderBy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoicePage {
    pub limit: u64,
    pub offset: u64,
    pub order: SortOrder,
    pub order_by: InvoiceOrderBy,
}

impl InvoicePagination {
    pub fn validate(&self) -> Result<InvoicePage, InvoiceValidationError> {
        let limit = self.limit.unwrap_or(INVOICE_PAGE_DEFAULT);
        if !(1..=INVOICE_PAGE_MAX).contains(&limit) {
            return Err(InvoiceValidationError::PageLimit);
        }
        Ok(InvoicePage {
            limit,
            offset: self.offset.unwrap_or(0),
            order: self.order.unwrap_or_default(),
            order_by: self.order_by.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ADDRESS: &str = "nano_3t6k35gi95xu6tergt6p69ck76ogmitsa8mnijtpxm9fkcm736xtoncuohr3";

    fn create(price: f64) -> InvoiceCreate {
        InvoiceCreate {
            title: "Coffee".into(),
            description: None,
            price,
            recipient_address: ADDRESS.into(),
            metadata: None,
            redirect_url: None,
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(InvoiceStatus::PaidPartial.as_ref(), "paid_partial");
        assert_eq!(
            InvoiceStatus::from_str("refunded_partial").unwrap(),
            InvoiceStatus::RefundedPartial
        );
        assert!(InvoiceStatus::from_str("settled").is_err());
        assert_eq!(
            serde_json::to_string(&InvoiceStatus::Canceled).unwrap(),
            "\"canceled\""
        );
    }

    #[test]
    fn only_open_invoices_accept_payments() {
        assert!(InvoiceStatus::Pending.accepts_payments());
        assert!(InvoiceStatus::Processing.accepts_payments());
        assert!(!InvoiceStatus::PaidPartial.accepts_payments());
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(!InvoiceStatus::PaidPartial.is_terminal());
        assert!(InvoiceStatus::Paid.is_refundable());
        assert!(!InvoiceStatus::Expired.is_refundable());
        assert!(InvoiceStatus::Pending.is_cancelable());
        assert!(!InvoiceStatus::Processing.is_cancelable());
    }

    #[test]
    fn lifecycle_transitions_follow_amounts() {
        let price = Raw::new(100);
        assert_eq!(status_after_payment(price, Raw::ZERO), InvoiceStatus::Pending);
        assert_eq!(
            status_after_payment(price, Raw::new(40)),
            InvoiceStatus::Processing
        );
        assert_eq!(status_after_payment(price, Raw::new(100)), InvoiceStatus::Paid);
        assert_eq!(status_after_payment(price, Raw::new(150)), InvoiceStatus::Paid);

        assert_eq!(status_after_expiry(Raw::ZERO), InvoiceStatus::Expired);
        assert_eq!(status_after_expiry(Raw::new(1)), InvoiceStatus::PaidPartial);

        assert_eq!(
            status_after_refund(Raw::new(100), Raw::new(30)),
            InvoiceStatus::RefundedPartial
        );
        assert_eq!(
            status_after_refund(Raw::new(100), Raw::new(100)),
            InvoiceStatus::Refunded
        );
    }

    #[test]
    fn create_rejects_price_out_of_range() {
        assert_eq!(
            create(0.000001).validate(),
            Err(InvoiceValidationError::PriceBelowMinimum)
        );
        assert_eq!(
            create(1_000_000.5).validate(),
            Err(InvoiceValidationError::PriceAboveMaximum)
        );
        assert!(create(INVOICE_MINIMUM_PRICE).validate().is_ok());
        assert!(create(INVOICE_MAXIMUM_PRICE).validate().is_ok());
    }

    #[test]
    fn create_rejects_bad_recipient() {
        let mut input = create(1.0);
        input.recipient_address = "nano_123".into();
        assert_eq!(
            input.validate(),
            Err(InvoiceValidationError::RecipientAddress(
                NanoAddressError::WrongLength
            ))
        );
    }

    #[test]
    fn create_checks_text_fields() {
        let mut input = create(1.0);
        input.title = "x".into();
        assert_eq!(input.validate(), Err(InvoiceValidationError::TitleLength));

        let mut input = create(1.0);
        input.description = Some("d".repeat(513));
        assert_eq!(
            input.validate(),
            Err(InvoiceValidationError::DescriptionTooLong)
        );

        let mut input = create(1.0);
        input.redirect_url = Some("javascript:alert(1)".into());
        assert_eq!(input.validate(), Err(InvoiceValidationError::RedirectUrl));
    }

    #[test]
    fn create_is_strict_about_fields() {
        let payload = serde_json::json!({
            "title": "Coffee",
            "price": 1.5,
            "recipient_address": ADDRESS,
            "currency": "BTC",
        });
        assert!(serde_json::from_value::<InvoiceCreate>(payload).is_err());
    }

    #[test]
    fn metadata_must_be_an_object() {
        let payload = serde_json::json!({
            "title": "Coffee",
            "price": 1.5,
            "recipient_address": ADDRESS,
            "metadata": [1, 2, 3],
        });
        assert!(serde_json::from_value::<InvoiceCreate>(payload).is_err());

        let payload = serde_json::json!({
            "title": "Coffee",
            "price": 1.5,
            "recipient_address": ADDRESS,
            "metadata": { "order": 42 },
        });
        let parsed: InvoiceCreate = serde_json::from_value(payload).unwrap();
        let valid = parsed.validate().unwrap();
        assert_eq!(valid.metadata.unwrap()["order"], 42);
        assert_eq!(valid.price, Raw::from_xno(1.5).unwrap());
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        let page = InvoicePagination::default().validate().unwrap();
        assert_eq!(page.limit, INVOICE_PAGE_DEFAULT);
        assert_eq!(page.offset, 0);
        assert_eq!(page.order, SortOrder::Desc);
        assert_eq!(page.order_by, InvoiceOrderBy::CreatedAt);

        let too_big = InvoicePagination {
            limit: Some(21),
            ..Default::default()
        };
        assert_eq!(too_big.validate(), Err(InvoiceValidationError::PageLimit));
        let zero = InvoicePagination {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.validate(), Err(InvoiceValidationError::PageLimit));
    }
}
