use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::attachment::Attachment;
use crate::domain::payment::{Payment, PaymentType};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    PickedUp,
    Returned,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationItem {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: String,
    pub customer_id: String,
    #[serde(default)]
    pub items: Vec<ReservationItem>,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pickup_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub return_date: Option<DateTime<Utc>>,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub advance: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub deposit: Option<Decimal>,
    #[serde(default)]
    pub status: ReservationStatus,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub amount_paid: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Amount paid toward a reservation and the status it implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaymentSummary {
    pub amount_paid: Decimal,
    pub status: PaymentStatus,
}

/// Sums the payments recorded against a reservation.
///
/// Security deposits are held separately and do not count toward the price;
/// refunds subtract.
pub fn summarize_payments<'a>(
    total: Decimal,
    payments: impl IntoIterator<Item = &'a Payment>,
) -> PaymentSummary {
    let amount_paid = payments.into_iter().fold(Decimal::ZERO, |sum, payment| {
        match payment.payment_type {
            PaymentType::Advance | PaymentType::Balance => sum + payment.amount,
            PaymentType::Refund => sum - payment.amount,
            PaymentType::Deposit => sum,
        }
    });

    let status = if amount_paid <= Decimal::ZERO {
        PaymentStatus::Unpaid
    } else if amount_paid >= total {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    };

    PaymentSummary { amount_paid, status }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{summarize_payments, PaymentStatus};
    use crate::domain::payment::{Payment, PaymentMethod, PaymentType};

    fn payment(amount: i64, payment_type: PaymentType) -> Payment {
        let now = Utc::now();
        Payment {
            id: format!("p-{amount}"),
            reservation_id: Some("r-1".to_string()),
            customer_id: None,
            amount: Decimal::new(amount, 0),
            method: PaymentMethod::Cash,
            payment_type,
            paid_at: now,
            reference: None,
            notes: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn no_payments_is_unpaid() {
        let summary = summarize_payments(Decimal::new(3000, 0), Vec::<Payment>::new().iter());
        assert_eq!(summary.status, PaymentStatus::Unpaid);
        assert_eq!(summary.amount_paid, Decimal::ZERO);
    }

    #[test]
    fn advance_below_total_is_partial() {
        let payments = [payment(1000, PaymentType::Advance)];
        let summary = summarize_payments(Decimal::new(3000, 0), &payments);
        assert_eq!(summary.status, PaymentStatus::Partial);
        assert_eq!(summary.amount_paid, Decimal::new(1000, 0));
    }

    #[test]
    fn deposits_do_not_count_and_refunds_subtract() {
        let payments = [
            payment(1000, PaymentType::Advance),
            payment(2000, PaymentType::Balance),
            payment(500, PaymentType::Deposit),
            payment(200, PaymentType::Refund),
        ];
        let summary = summarize_payments(Decimal::new(3000, 0), &payments);
        assert_eq!(summary.amount_paid, Decimal::new(2800, 0));
        assert_eq!(summary.status, PaymentStatus::Partial);
    }

    #[test]
    fn full_amount_is_paid() {
        let payments = [payment(1000, PaymentType::Advance), payment(2000, PaymentType::Balance)];
        let summary = summarize_payments(Decimal::new(3000, 0), &payments);
        assert_eq!(summary.status, PaymentStatus::Paid);
    }
}
