use courier::error::RequestError;
use courier::http::headers::HeaderMap;
use courier::http::request::{Body, Endpoint, Method, Request, RequestBuilder};

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
        ("TRACE", Method::TRACE),
        ("CONNECT", Method::CONNECT),
    ];

    for (method_str, expected) in methods {
        assert_eq!(method_str.parse::<Method>().unwrap(), expected);
        assert_eq!(expected.as_str(), method_str);
    }
}

#[test]
fn test_method_is_case_sensitive() {
    assert_eq!(
        "get".parse::<Method>(),
        Err(RequestError::UnknownMethod("get".to_string()))
    );
}

#[test]
fn test_endpoint_default_ports() {
    let (_, http) = Endpoint::parse("http://example.com/a").unwrap();
    assert_eq!(http.host, "example.com");
    assert_eq!(http.port, 80);
    assert!(!http.tls);
    assert_eq!(http.authority, "example.com");

    let (_, https) = Endpoint::parse("https://example.com").unwrap();
    assert_eq!(https.port, 443);
    assert!(https.tls);
}

#[test]
fn test_endpoint_explicit_port_goes_into_authority() {
    let (_, endpoint) = Endpoint::parse("http://localhost:3000/api").unwrap();
    assert_eq!(endpoint.port, 3000);
    assert_eq!(endpoint.authority, "localhost:3000");
    assert_eq!(endpoint.to_string(), "localhost:3000");
}

#[test]
fn test_endpoint_ipv6_literal() {
    let (_, endpoint) = Endpoint::parse("http://[::1]:8080/").unwrap();
    assert_eq!(endpoint.host, "::1");
    assert_eq!(endpoint.authority, "[::1]:8080");
    assert_eq!(endpoint.to_string(), "[::1]:8080");
}

#[test]
fn test_endpoint_rejects_unsupported_scheme() {
    assert_eq!(
        Endpoint::parse("ftp://example.com/file").unwrap_err(),
        RequestError::UnsupportedScheme("ftp".to_string())
    );
    assert!(matches!(
        Endpoint::parse("mailto:someone@example.com"),
        Err(RequestError::UnsupportedScheme(_))
    ));
}

#[test]
fn test_endpoint_rejects_missing_host() {
    assert!(matches!(
        Endpoint::parse("http://"),
        Err(RequestError::InvalidUrl(_))
    ));
    assert!(matches!(
        Endpoint::parse("not a url"),
        Err(RequestError::InvalidUrl(_))
    ));
}

#[test]
fn test_request_target_includes_query() {
    let request = Request::new(Method::GET, "http://example.com/search?q=rust").unwrap();
    assert_eq!(request.target(), "/search?q=rust");

    let root = Request::new(Method::GET, "http://example.com").unwrap();
    assert_eq!(root.target(), "/");
}

#[test]
fn test_request_builder() {
    let request = RequestBuilder::new(Method::POST, "http://localhost:8080/api/data")
        .header("Content-Type", "application/json")
        .body("{}")
        .build()
        .unwrap();

    assert_eq!(request.method, Method::POST);
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert!(matches!(request.body, Body::Full(ref b) if &b[..] == b"{}"));
}

#[test]
fn test_request_builder_rejects_invalid_url() {
    let result = RequestBuilder::new(Method::GET, "gopher://example.com").build();
    assert!(matches!(result, Err(RequestError::UnsupportedScheme(_))));
}

#[test]
fn test_request_keep_alive() {
    let mut request = Request::new(Method::GET, "http://example.com").unwrap();
    assert!(request.keep_alive());

    request.set_header("Connection", "close");
    assert!(!request.keep_alive());
}

#[test]
fn test_header_map_remove_and_lookup() {
    let mut headers = HeaderMap::new();
    headers.append("Accept", "text/html");
    headers.append("accept", "application/json");

    assert_eq!(headers.get("ACCEPT"), Some("text/html"));
    assert_eq!(headers.remove("Accept"), Some("text/html".to_string()));
    assert!(headers.is_empty());
}
