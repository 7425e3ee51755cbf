use serde::{Deserialize, Serialize};

/// A business entity bidding on work, keyed by its NEQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub neq: String,
    pub business_name: String,
    pub contact_name: String,
    pub phone: String,
    pub email: String,
}

/// A resident reporting problems, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
}

impl Resident {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Exactly ten ASCII digits.
pub fn is_valid_neq(raw: &str) -> bool {
    raw.len() == 10 && raw.bytes().all(|byte| byte.is_ascii_digit())
}

pub fn is_valid_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '_' | '.' | '-'));
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-'));
    let tld_ok = tld.len() >= 2 && tld.chars().all(|ch| ch.is_ascii_alphabetic());
    local_ok && host_ok && tld_ok
}

/// `514-555-0199`, `514.555.0199`, `514 555 0199` or `5145550199`.
pub fn is_valid_phone(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let digits: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(u8::is_ascii_digit)
        .collect();
    if digits.len() != 10 {
        return false;
    }
    match bytes.len() {
        10 => true,
        12 => {
            let sep = [bytes[3], bytes[7]];
            sep.iter().all(|byte| matches!(byte, b'-' | b'.' | b' '))
                && bytes[..3].iter().all(u8::is_ascii_digit)
                && bytes[4..7].iter().all(u8::is_ascii_digit)
                && bytes[8..].iter().all(u8::is_ascii_digit)
        }
        _ => false,
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
