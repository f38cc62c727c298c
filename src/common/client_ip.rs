use axum::http::HeaderMap;

/// First address listed in `X-Forwarded-For`, if any.
pub fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let ip = value.split(',').next()?.trim();

    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));

        assert_eq!(forwarded_for(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn missing_or_blank_header_yields_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(forwarded_for(&headers), None);

        headers.insert("x-forwarded-for", HeaderValue::from_static(" ,10.0.0.1"));
        assert_eq!(forwarded_for(&headers), None);
    }
}
