//! Client key derivation for admission decisions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};

/// Authenticated principal, inserted into request extensions by the host
/// application's auth layer.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
}

/// Fully custom key derivation.
pub type KeyFn = dyn Fn(&Request) -> String + Send + Sync;

/// Strategy for mapping a request to the key it is throttled by.
#[derive(Clone)]
pub enum KeyStrategy {
    /// Forwarded-for header, else connection address, else `"unknown"`.
    ClientIp,
    /// `user:{id}` when an authenticated user is present, else `ip:{addr}`.
    UserOrIp,
    /// Namespace another strategy's key under an endpoint label, giving
    /// the same client independent quotas per endpoint.
    Scoped {
        label: String,
        inner: Box<KeyStrategy>,
    },
    /// Caller-supplied derivation.
    Custom(Arc<KeyFn>),
}

impl KeyStrategy {
    pub fn derive(&self, request: &Request) -> String {
        match self {
            KeyStrategy::ClientIp => client_ip(request),
            KeyStrategy::UserOrIp => match request.extensions().get::<AuthenticatedUser>() {
                Some(user) => format!("user:{}", user.id),
                None => format!("ip:{}", client_ip(request)),
            },
            KeyStrategy::Scoped { label, inner } => {
                format!("{}:{}", label, inner.derive(request))
            }
            KeyStrategy::Custom(derive) => derive(request),
        }
    }
}

/// Resolve the client address: first hop of `x-forwarded-for` when
/// present, else the socket address recorded at accept time.
pub fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn empty_request() -> Request {
        Request::new(Body::empty())
    }

    fn forwarded_request(value: &'static str) -> Request {
        let mut request = empty_request();
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static(value));
        request
    }

    #[test]
    fn test_forwarded_header_takes_first_hop() {
        let request = forwarded_request("192.168.1.1, 10.0.0.1");
        assert_eq!(client_ip(&request), "192.168.1.1");
    }

    #[test]
    fn test_forwarded_header_is_trimmed() {
        let request = forwarded_request("  203.0.113.5 , 10.0.0.1");
        assert_eq!(client_ip(&request), "203.0.113.5");
    }

    #[test]
    fn test_connection_address_fallback() {
        let mut request = empty_request();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 41000))));
        assert_eq!(client_ip(&request), "203.0.113.9");
    }

    #[test]
    fn test_unknown_without_any_address_source() {
        assert_eq!(client_ip(&empty_request()), "unknown");
    }

    #[test]
    fn test_user_strategy_prefers_authenticated_user() {
        let mut request = forwarded_request("192.168.1.1");
        request.extensions_mut().insert(AuthenticatedUser {
            id: "u-42".to_string(),
        });
        assert_eq!(KeyStrategy::UserOrIp.derive(&request), "user:u-42");
    }

    #[test]
    fn test_user_strategy_falls_back_to_ip() {
        let request = forwarded_request("192.168.1.1");
        assert_eq!(KeyStrategy::UserOrIp.derive(&request), "ip:192.168.1.1");
    }

    #[test]
    fn test_scoped_strategy_namespaces_inner_key() {
        let strategy = KeyStrategy::Scoped {
            label: "auth".to_string(),
            inner: Box::new(KeyStrategy::ClientIp),
        };
        let request = forwarded_request("192.168.1.1");
        assert_eq!(strategy.derive(&request), "auth:192.168.1.1");
    }

    #[test]
    fn test_custom_strategy() {
        let strategy = KeyStrategy::Custom(Arc::new(|request: &Request| {
            request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("anonymous")
                .to_string()
        }));

        let mut request = empty_request();
        request
            .headers_mut()
            .insert("x-api-key", HeaderValue::from_static("key-abc"));
        assert_eq!(strategy.derive(&request), "key-abc");
        assert_eq!(strategy.derive(&empty_request()), "anonymous");
    }
}
