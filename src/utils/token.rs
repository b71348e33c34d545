use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, seq::SliceRandom, thread_rng, Rng};

/// Upper-case letters and digits without look-alikes (0/O, 1/I/L).
const UNAMBIGUOUS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

pub fn generate_access_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn unambiguous(length: usize) -> String {
    let mut rng = thread_rng();
    (0..length)
        .map(|_| *UNAMBIGUOUS.choose(&mut rng).unwrap_or(&b'X') as char)
        .collect()
}

/// Redeemable access code, e.g. `K7QM2ZPA`.
pub fn generate_access_code() -> String {
    unambiguous(8)
}

/// Human-facing certificate number, e.g. `CERT-20250301-7KQ2MZ`.
pub fn generate_certificate_number(issued_at: DateTime<Utc>) -> String {
    format!("CERT-{}-{}", issued_at.format("%Y%m%d"), unambiguous(6))
}

pub fn generate_verification_code() -> String {
    unambiguous(12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn access_token_has_requested_length() {
        let t = generate_access_token(48);
        assert_eq!(t.len(), 48);
        assert!(t.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn certificate_number_embeds_issue_date() {
        let issued = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let n = generate_certificate_number(issued);
        assert!(n.starts_with("CERT-20250301-"));
        assert_eq!(n.len(), "CERT-20250301-".len() + 6);
    }

    #[test]
    fn verification_code_avoids_ambiguous_characters() {
        for _ in 0..50 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 12);
            assert!(!code.chars().any(|c| "0O1IL".contains(c)));
        }
    }

    #[test]
    fn access_codes_are_upper_case() {
        let code = generate_access_code();
        assert_eq!(code, code.to_uppercase());
        assert_eq!(code.len(), 8);
    }
}
