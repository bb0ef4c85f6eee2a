//! Human-facing identifiers for applications and contracts.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use super::domain::ApplicationType;

/// `{LEA|SLB}-{year}-{5 digits}`.
pub fn application_reference<R: Rng + ?Sized>(
    kind: ApplicationType,
    at: DateTime<Utc>,
    rng: &mut R,
) -> String {
    let serial: u32 = rng.gen_range(0..100_000);
    format!("{}-{}-{serial:05}", kind.reference_prefix(), at.year())
}

/// `A000` followed by six digits.
pub fn contract_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    let serial: u32 = rng.gen_range(0..1_000_000);
    format!("A000{serial:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn application_reference_has_prefix_year_and_five_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        for _ in 0..50 {
            let reference = application_reference(ApplicationType::SaleLeaseback, at, &mut rng);
            let serial = reference
                .strip_prefix("SLB-2026-")
                .expect("prefix and year");
            assert_eq!(serial.len(), 5);
            assert!(serial.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn contract_number_is_ten_characters() {
        let mut rng = StdRng::seed_from_u64(11);
        let number = contract_number(&mut rng);
        assert!(number.starts_with("A000"));
        assert_eq!(number.len(), 10);
        assert!(number[4..].chars().all(|c| c.is_ascii_digit()));
    }
}
