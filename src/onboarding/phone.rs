//! Phone number masking, validation, and normalisation.

/// Length of a one-time verification code.
pub const CODE_LEN: usize = 6;

const NATIONAL_DIGITS: usize = 10;

fn digits(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Mask raw input as `(AAA) BBB-CCCC`, producing partial forms while typing.
///
/// Under 4 digits the digits are returned as-is; under 7 the area code is
/// parenthesised; anything longer is truncated to 10 digits.
pub fn format_phone_number(input: &str) -> String {
    let d = digits(input);
    match d.len() {
        0..=3 => d,
        4..=6 => format!("({}) {}", &d[..3], &d[3..]),
        n => format!(
            "({}) {}-{}",
            &d[..3],
            &d[3..6],
            &d[6..n.min(NATIONAL_DIGITS)]
        ),
    }
}

/// True if `phone` holds exactly 10 digits and is already in masked form.
pub fn is_complete_phone(phone: &str) -> bool {
    digits(phone).len() == NATIONAL_DIGITS && format_phone_number(phone) == phone
}

/// Normalise a masked number to `+<country><digits>`.
pub fn to_e164(phone: &str, country_code: &str) -> String {
    format!("+{}{}", country_code, digits(phone))
}

/// Keep only digits, at most [`CODE_LEN`] of them.
pub fn sanitize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(CODE_LEN)
        .collect()
}

/// Last four digits for log output.
pub fn mask_for_log(phone: &str) -> String {
    let d = digits(phone);
    let tail = &d[d.len().saturating_sub(4)..];
    format!("***{tail}")
}
