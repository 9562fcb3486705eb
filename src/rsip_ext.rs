//! Small helpers over the rsip message types: identifier generation,
//! Via surgery, and access to headers the typed layer does not cover.

use crate::{Error, Result};
use rand::Rng;
use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};
use rsip::{Header, Request, Response};

/// Generate a dialog tag.
pub fn make_tag() -> String {
    format!("{:08x}", rand::rng().random::<u32>())
}

/// Generate an RFC 3261 Via branch.
pub fn make_branch() -> String {
    format!("z9hG4bK{}", uuid::Uuid::new_v4().simple())
}

pub fn make_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build an untyped Via header for the given sent-by host:port.
pub fn make_via(sent_by: &str, branch: &str) -> rsip::headers::Via {
    rsip::headers::Via::new(format!("SIP/2.0/UDP {};branch={}", sent_by, branch))
}

/// Pull the bare URI out of a Contact header value, with or without
/// angle brackets or a display name.
pub fn extract_uri_from_contact(line: &str) -> Result<rsip::Uri> {
    let s = match (line.find('<'), line.find('>')) {
        (Some(start), Some(end)) if start < end => &line[start + 1..end],
        _ => line.split(';').next().unwrap_or(line).trim(),
    };
    rsip::Uri::try_from(s).map_err(Error::from)
}

/// Prepend a Via to a request, ahead of any existing ones.
pub fn insert_first_via(req: &mut Request, via: rsip::headers::Via) {
    let mut headers: Vec<Header> = Vec::with_capacity(req.headers.iter().count() + 1);
    headers.push(Header::Via(via));
    headers.extend(req.headers.iter().cloned());
    req.headers = headers.into();
}

/// Strip the topmost Via from a response.
pub fn remove_first_via(resp: &mut Response) {
    let mut removed = false;
    let mut headers: Vec<Header> = Vec::with_capacity(resp.headers.iter().count());
    for h in resp.headers.iter() {
        if !removed {
            if let Header::Via(_) = h {
                removed = true;
                continue;
            }
        }
        headers.push(h.clone());
    }
    resp.headers = headers.into();
}

/// All Contact headers of a response, in order, as typed values.
pub fn response_contacts(resp: &Response) -> Result<Vec<rsip::typed::Contact>> {
    let mut contacts = Vec::new();
    for h in resp.headers.iter() {
        if let Header::Contact(c) = h {
            contacts.push(c.clone().typed()?);
        }
    }
    Ok(contacts)
}

/// Record-Route values of a message, converted to Route headers in
/// header order.
pub fn record_route_set(headers: &rsip::Headers) -> Vec<rsip::headers::Route> {
    headers
        .iter()
        .filter_map(|h| match h {
            Header::RecordRoute(rr) => Some(rsip::headers::Route::from(rr.value().to_string())),
            _ => None,
        })
        .collect()
}

/// Value of an extension header matched by name, case-insensitively.
pub fn extension_header_value(headers: &rsip::Headers, name: &str) -> Option<String> {
    headers.iter().find_map(|h| match h {
        Header::Other(n, v) if n.eq_ignore_ascii_case(name) => Some(v.clone()),
        _ => None,
    })
}

/// The authentication challenge carried by a 401/407 final, if any.
pub fn challenge_header(resp: &Response, scode: u16) -> Option<Header> {
    resp.headers.iter().find_map(|h| match h {
        Header::WwwAuthenticate(_) if scode == 401 => Some(h.clone()),
        Header::ProxyAuthenticate(_) if scode == 407 => Some(h.clone()),
        _ => None,
    })
}

/// Status code for an arbitrary numeric code.
pub fn status_code(code: u16) -> rsip::StatusCode {
    rsip::StatusCode::try_from(code).unwrap_or(rsip::StatusCode::Other(code, String::new()))
}

pub fn status_code_value(status: &rsip::StatusCode) -> u16 {
    status.code()
}

/// Canonical reason phrase for the codes this layer deals in.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Trying",
        180 => "Ringing",
        181 => "Call Is Being Forwarded",
        182 => "Queued",
        183 => "Session Progress",
        200 => "OK",
        202 => "Accepted",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        305 => "Use Proxy",
        380 => "Alternative Service",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        415 => "Unsupported Media Type",
        422 => "Session Interval Too Small",
        480 => "Temporarily Unavailable",
        481 => "Call/Transaction Does Not Exist",
        482 => "Loop Detected",
        483 => "Too Many Hops",
        486 => "Busy Here",
        487 => "Request Terminated",
        488 => "Not Acceptable Here",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Server Time-out",
        600 => "Busy Everywhere",
        603 => "Decline",
        604 => "Does Not Exist Anywhere",
        606 => "Not Acceptable",
        _ => "Unknown",
    }
}

/// To-header tag of a response, `None` when absent.
pub fn to_tag(resp: &Response) -> Result<Option<String>> {
    let to = resp.to_header()?.clone().typed()?;
    Ok(to.params.iter().find_map(|p| match p {
        rsip::Param::Tag(tag) => Some(tag.value().to_string()),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsip::headers::*;

    fn response_with(headers: Vec<Header>) -> Response {
        Response {
            status_code: rsip::StatusCode::OK,
            version: rsip::Version::V2,
            headers: headers.into(),
            body: vec![],
        }
    }

    #[test]
    fn branch_has_magic_cookie() {
        let b = make_branch();
        assert!(b.starts_with("z9hG4bK"));
        assert_ne!(make_branch(), b);
    }

    #[test]
    fn contact_uri_extraction() {
        let uri = extract_uri_from_contact("Bob <sip:bob@example.com:5060>;expires=60").unwrap();
        assert_eq!(uri.to_string(), "sip:bob@example.com:5060");
        let uri = extract_uri_from_contact("sip:carol@example.org;transport=udp").unwrap();
        assert_eq!(uri.to_string(), "sip:carol@example.org");
    }

    #[test]
    fn via_insert_and_remove() {
        let mut req = Request {
            method: rsip::Method::Invite,
            uri: rsip::Uri::try_from("sip:bob@example.com").unwrap(),
            headers: vec![
                Via::new("SIP/2.0/UDP a.example.com;branch=z9hG4bKaaa").into(),
                CallId::new("x").into(),
            ]
            .into(),
            version: rsip::Version::V2,
            body: vec![],
        };
        insert_first_via(&mut req, make_via("proxy.example.com:5060", "z9hG4bKbbb"));
        let vias: Vec<_> = req
            .headers
            .iter()
            .filter(|h| matches!(h, Header::Via(_)))
            .collect();
        assert_eq!(vias.len(), 2);
        match req.headers.iter().next().unwrap() {
            Header::Via(v) => assert!(v.value().contains("z9hG4bKbbb")),
            other => panic!("first header is {:?}", other),
        }

        let mut resp = response_with(vec![
            Via::new("SIP/2.0/UDP proxy.example.com:5060;branch=z9hG4bKbbb").into(),
            Via::new("SIP/2.0/UDP a.example.com;branch=z9hG4bKaaa").into(),
        ]);
        remove_first_via(&mut resp);
        let vias: Vec<_> = resp
            .headers
            .iter()
            .filter_map(|h| match h {
                Header::Via(v) => Some(v.value().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(vias, vec!["SIP/2.0/UDP a.example.com;branch=z9hG4bKaaa"]);
    }

    #[test]
    fn to_tag_absent_and_present() {
        let resp = response_with(vec![To::new("Bob <sip:bob@example.com>").into()]);
        assert_eq!(to_tag(&resp).unwrap(), None);
        let resp = response_with(vec![To::new("Bob <sip:bob@example.com>;tag=abc").into()]);
        assert_eq!(to_tag(&resp).unwrap(), Some("abc".to_string()));
    }

    #[test]
    fn challenge_only_for_matching_code() {
        let resp = response_with(vec![WwwAuthenticate::new(
            "Digest realm=\"example.com\", nonce=\"xyz\"",
        )
        .into()]);
        assert!(challenge_header(&resp, 401).is_some());
        assert!(challenge_header(&resp, 407).is_none());
    }

    #[test]
    fn record_routes_in_order() {
        let resp = response_with(vec![
            RecordRoute::new("<sip:p1.example.com;lr>").into(),
            RecordRoute::new("<sip:p2.example.com;lr>").into(),
        ]);
        let routes = record_route_set(&resp.headers);
        assert_eq!(routes.len(), 2);
        assert!(routes[0].value().contains("p1"));
    }
}
