//! Invoices, session packages and the revenue roll-up.

use crate::calendar::local_date;
use crate::model::{Payment, PaymentStatus};
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde::Serialize;
use thiserror::Error;

/// Largest single invoice, in US dollars.
pub const MAX_INVOICE_AMOUNT: f64 = 1_000_000.0;
pub const DEFAULT_INVOICE_DESCRIPTION: &str = "Invoice";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub price: f64,
    pub sessions: u32,
    pub popular: bool,
}

pub const PACKAGES: [SessionPackage; 4] = [
    SessionPackage {
        id: "1",
        name: "Single Session",
        description: "One 60-minute Bitcoin education session",
        price: 150.0,
        sessions: 1,
        popular: false,
    },
    SessionPackage {
        id: "2",
        name: "Starter Pack",
        description: "5 sessions with 10% discount",
        price: 675.0,
        sessions: 5,
        popular: true,
    },
    SessionPackage {
        id: "3",
        name: "Pro Pack",
        description: "10 sessions with 20% discount",
        price: 1200.0,
        sessions: 10,
        popular: false,
    },
    SessionPackage {
        id: "4",
        name: "Monthly Subscription",
        description: "4 sessions per month, cancel anytime",
        price: 500.0,
        sessions: 4,
        popular: false,
    },
];

#[derive(Debug, Error, PartialEq)]
pub enum PaymentError {
    #[error("amount must be positive and at most 1000000")]
    BadAmount,
    #[error("payment is already {0}")]
    AlreadySettled(PaymentStatus),
    #[error("a payment can only be settled as completed or failed")]
    NotASettlement,
}

pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Positive, finite and capped; returned rounded to cents.
pub fn check_amount(amount: f64) -> Result<f64, PaymentError> {
    let cents = round_cents(amount);
    if !amount.is_finite() || cents <= 0.0 || cents > MAX_INVOICE_AMOUNT {
        return Err(PaymentError::BadAmount);
    }
    Ok(cents)
}

/// Pending invoices settle exactly once, as completed or failed.
pub fn settle(payment: &mut Payment, to: PaymentStatus, at: DateTime<Utc>) -> Result<(), PaymentError> {
    if payment.status != PaymentStatus::Pending {
        return Err(PaymentError::AlreadySettled(payment.status));
    }
    if to == PaymentStatus::Pending {
        return Err(PaymentError::NotASettlement);
    }
    payment.status = to;
    payment.settled_at = Some(at);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total_revenue: f64,
    pub pending_revenue: f64,
    /// Completed invoices raised in the viewer's current calendar month.
    pub this_month_revenue: f64,
    pub completed_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,
    pub average_payment: f64,
}

pub fn summarize(payments: &[Payment], now: DateTime<Utc>, offset: FixedOffset) -> RevenueSummary {
    let today = local_date(now, offset);
    let same_month = |p: &Payment| {
        let day = local_date(p.created_at, offset);
        day.year() == today.year() && day.month() == today.month()
    };
    let sum = |pred: &dyn Fn(&Payment) -> bool| -> f64 {
        round_cents(payments.iter().filter(|p| pred(p)).map(|p| p.amount).sum())
    };
    let count = |status: PaymentStatus| payments.iter().filter(|p| p.status == status).count();

    let total_revenue = sum(&|p| p.status == PaymentStatus::Completed);
    let completed_count = count(PaymentStatus::Completed);
    RevenueSummary {
        total_revenue,
        pending_revenue: sum(&|p| p.status == PaymentStatus::Pending),
        this_month_revenue: sum(&|p| p.status == PaymentStatus::Completed && same_month(p)),
        completed_count,
        pending_count: count(PaymentStatus::Pending),
        failed_count: count(PaymentStatus::Failed),
        average_payment: round_cents(total_revenue / completed_count.max(1) as f64),
    }
}
