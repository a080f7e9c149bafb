use regex_lite::Regex;
use thiserror::Error;

lazy_static! {
    /// The single shape we accept:
    /// `received Ksh<amount> from <name> <10-digit phone> on <DD/MM/YY>`.
    /// Amount allows comma thousands separators and an optional decimal
    /// part; the name capture is lazy so it stops at the phone token.
    static ref PAYMENT_RE: Regex = Regex::new(
        r"(?i)received\s+ksh([0-9][0-9,]*(?:\.[0-9]+)?)\s+from\s+(.+?)\s+([0-9]{10})\s+on\s+([0-9]{2}/[0-9]{2}/[0-9]{2})"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayment {
    pub amount: f64,
    pub name: String,
    pub phone: String,
    /// DD/MM/YY token lifted verbatim from the SMS. Stored into the rent
    /// record's `month` field, not `date_collected`.
    pub date_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not recognise an M-PESA payment in that message")]
pub struct UnparseableMessage;

/// Extracts a payment from a free-text SMS body. Pure pattern matching,
/// no fallback heuristics; anything off-shape is rejected for the caller
/// to surface.
pub fn parse_payment(message: &str) -> Result<ParsedPayment, UnparseableMessage> {
    let caps = PAYMENT_RE.captures(message).ok_or(UnparseableMessage)?;

    let amount = caps[1]
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| UnparseableMessage)?;

    Ok(ParsedPayment {
        amount,
        name: caps[2].trim().to_owned(),
        phone: caps[3].to_owned(),
        date_token: caps[4].to_owned(),
    })
}
