//! WhatsApp contact handoff links.

use crate::validate::normalize_phone;
use crate::Result;

const WHATSAPP_BASE: &str = "https://wa.me/";

/// Build a `wa.me` deep link, optionally pre-filling the chat with `message`.
pub fn whatsapp_link(phone: &str, message: Option<&str>) -> Result<String> {
    let digits = normalize_phone(phone)?;
    let mut url = format!("{WHATSAPP_BASE}{digits}");
    if let Some(msg) = message.map(str::trim).filter(|m| !m.is_empty()) {
        url.push_str("?text=");
        url.push_str(&percent_encode(msg));
    }
    Ok(url)
}

/// Default greeting a buyer sends when opening a chat about a listing.
pub fn greeting(buyer_name: &str, subject: Option<&str>) -> String {
    match subject {
        Some(s) => format!("Hi, I'm {buyer_name} from Frontline. I'm interested in \"{s}\"."),
        None => format!("Hi, I'm {buyer_name} from Frontline."),
    }
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_without_message() {
        let url = whatsapp_link("+233 24 123 4567", None).unwrap();
        assert_eq!(url, "https://wa.me/233241234567");
    }

    #[test]
    fn test_link_encodes_message() {
        let url = whatsapp_link("233241234567", Some("Hi & hello?")).unwrap();
        assert_eq!(url, "https://wa.me/233241234567?text=Hi%20%26%20hello%3F");
    }

    #[test]
    fn test_blank_message_omitted() {
        let url = whatsapp_link("233241234567", Some("   ")).unwrap();
        assert!(!url.contains('?'));
    }

    #[test]
    fn test_utf8_is_byte_encoded() {
        let url = whatsapp_link("233241234567", Some("café")).unwrap();
        assert!(url.ends_with("caf%C3%A9"));
    }

    #[test]
    fn test_bad_phone_rejected() {
        assert!(whatsapp_link("123", None).is_err());
    }
}
