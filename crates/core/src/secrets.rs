/// Mask a secret value for safe display in logs.
/// Shows first 4 and last 4 chars, the rest as `****`.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        "****".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    }
}
