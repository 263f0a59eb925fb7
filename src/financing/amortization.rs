//! Installment terms calculator
//!
//! Derives the monthly payment and total payable for a financing request.
//! All math runs on `rust_decimal::Decimal`; only the final monthly figure is
//! rounded, so identical inputs always produce identical outputs.

use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use thiserror::Error;

/// Rejected financing terms
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTerms {
    #[error("principal must be greater than zero")]
    NonPositivePrincipal,

    #[error("installment count must be at least 1")]
    NoInstallments,

    #[error("monthly rate must not be negative")]
    NegativeRate,

    #[error("terms produce a value outside the representable range")]
    Unrepresentable,
}

/// Computed installment terms, rounded to cents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentTerms {
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
}

/// Compute installment terms for `principal` over `installments` months at
/// `monthly_rate` (fraction, e.g. 0.025 for 2.5%).
///
/// Zero-rate plans split the principal evenly; otherwise the standard
/// amortizing-loan formula applies:
///
/// ```text
/// monthly = P * r * (1 + r)^n / ((1 + r)^n - 1)
/// ```
///
/// The monthly payment is rounded half-up to two decimals and the total is
/// that rounded figure times `installments`, so the pair always agrees to the
/// cent.
pub fn payment_terms(
    principal: Decimal,
    installments: u32,
    monthly_rate: Decimal,
) -> Result<PaymentTerms, InvalidTerms> {
    if principal <= Decimal::ZERO {
        return Err(InvalidTerms::NonPositivePrincipal);
    }
    if installments < 1 {
        return Err(InvalidTerms::NoInstallments);
    }
    if monthly_rate < Decimal::ZERO {
        return Err(InvalidTerms::NegativeRate);
    }

    let count = Decimal::from(installments);

    let raw_monthly = if monthly_rate.is_zero() {
        principal
            .checked_div(count)
            .ok_or(InvalidTerms::Unrepresentable)?
    } else {
        // (1 + r)^n, kept at full precision until the final rounding step.
        let growth = (Decimal::ONE + monthly_rate)
            .checked_powu(u64::from(installments))
            .ok_or(InvalidTerms::Unrepresentable)?;

        let numerator = principal
            .checked_mul(monthly_rate)
            .and_then(|v| v.checked_mul(growth))
            .ok_or(InvalidTerms::Unrepresentable)?;

        let denominator = growth - Decimal::ONE;

        numerator
            .checked_div(denominator)
            .ok_or(InvalidTerms::Unrepresentable)?
    };

    let monthly_payment =
        raw_monthly.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    let total_amount = monthly_payment
        .checked_mul(count)
        .ok_or(InvalidTerms::Unrepresentable)?;

    Ok(PaymentTerms {
        monthly_payment,
        total_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_standard_amortization() {
        let terms = payment_terms(dec!(5000), 12, dec!(0.025)).unwrap();

        assert_eq!(terms.monthly_payment, dec!(487.44));
        assert_eq!(terms.total_amount, dec!(5849.28));
    }

    #[test]
    fn test_six_installments() {
        let terms = payment_terms(dec!(3000), 6, dec!(0.025)).unwrap();

        assert_eq!(terms.monthly_payment, dec!(544.65));
        assert_eq!(terms.total_amount, dec!(3267.90));
    }

    #[test]
    fn test_zero_rate_splits_principal_evenly() {
        let terms = payment_terms(dec!(1200), 12, Decimal::ZERO).unwrap();

        assert_eq!(terms.monthly_payment, dec!(100.00));
        assert_eq!(terms.total_amount, dec!(1200.00));
    }

    #[test]
    fn test_zero_rate_rounds_half_up() {
        let terms = payment_terms(dec!(5000), 12, Decimal::ZERO).unwrap();

        // 416.666... rounds up; the total follows the rounded monthly figure.
        assert_eq!(terms.monthly_payment, dec!(416.67));
        assert_eq!(terms.total_amount, dec!(5000.04));
    }

    #[test]
    fn test_monthly_times_count_equals_total() {
        let terms = payment_terms(dec!(7431.19), 17, dec!(0.0185)).unwrap();

        assert_eq!(
            terms.monthly_payment * Decimal::from(17u32),
            terms.total_amount
        );
    }

    #[test]
    fn test_single_installment() {
        let terms = payment_terms(dec!(1000), 1, dec!(0.02)).unwrap();

        // One installment repays principal plus one month of interest.
        assert_eq!(terms.monthly_payment, dec!(1020.00));
        assert_eq!(terms.total_amount, dec!(1020.00));
    }

    #[test]
    fn test_deterministic() {
        let a = payment_terms(dec!(5000), 12, dec!(0.025)).unwrap();
        let b = payment_terms(dec!(5000), 12, dec!(0.025)).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_non_positive_principal() {
        assert_eq!(
            payment_terms(Decimal::ZERO, 12, dec!(0.025)),
            Err(InvalidTerms::NonPositivePrincipal)
        );
        assert_eq!(
            payment_terms(dec!(-100), 12, dec!(0.025)),
            Err(InvalidTerms::NonPositivePrincipal)
        );
    }

    #[test]
    fn test_rejects_zero_installments() {
        assert_eq!(
            payment_terms(dec!(1000), 0, dec!(0.025)),
            Err(InvalidTerms::NoInstallments)
        );
    }

    #[test]
    fn test_rejects_negative_rate() {
        assert_eq!(
            payment_terms(dec!(1000), 12, dec!(-0.01)),
            Err(InvalidTerms::NegativeRate)
        );
    }
}
