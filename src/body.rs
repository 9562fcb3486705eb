use crate::{Error, Result};

/// Parsed form of a message body.
///
/// Anything that is not `application/sdp` stays an opaque string and
/// round-trips untouched.
#[derive(Debug, Clone)]
pub enum ParsedBody {
    Sdp(Box<sdp_rs::SessionDescription>),
    Generic(String),
}

impl ParsedBody {
    fn render(&self) -> String {
        match self {
            ParsedBody::Sdp(sdp) => sdp.to_string(),
            ParsedBody::Generic(s) => s.clone(),
        }
    }
}

/// A SIP message body: content type plus raw text, with a lazily
/// constructed parsed view.
///
/// `needs_update` means the application has not yet rewritten the media
/// endpoints for outbound use; it is set on construction (and on copy)
/// and cleared by the call controller after the rewrite.
#[derive(Debug, Clone)]
pub struct MsgBody {
    mtype: String,
    string_content: String,
    parsed: Option<ParsedBody>,
    needs_update: bool,
}

impl MsgBody {
    pub fn new(content: impl Into<String>, mtype: impl Into<String>) -> Self {
        MsgBody {
            mtype: mtype.into(),
            string_content: content.into(),
            parsed: None,
            needs_update: true,
        }
    }

    pub fn new_sdp(content: impl Into<String>) -> Self {
        Self::new(content, "application/sdp")
    }

    /// Wrap the body of a SIP message, if it has one. The content type
    /// is taken from the Content-Type header, defaulting to
    /// `application/sdp` when the header is missing.
    pub fn from_parts(headers: &rsip::Headers, body: &[u8]) -> Option<MsgBody> {
        if body.is_empty() {
            return None;
        }
        use rsip::prelude::UntypedHeader;
        let mtype = headers
            .iter()
            .find_map(|h| match h {
                rsip::Header::ContentType(ct) => Some(ct.value().to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "application/sdp".to_string());
        Some(MsgBody::new(String::from_utf8_lossy(body).into_owned(), mtype))
    }

    pub fn mtype(&self) -> &str {
        &self.mtype
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    pub fn set_needs_update(&mut self, v: bool) {
        self.needs_update = v;
    }

    /// Parsed view of the body, parsing on first access.
    ///
    /// `multipart/mixed` bodies are reduced to their first
    /// `application/sdp` sub-part before parsing; the sub-part's type and
    /// text replace the outer ones.
    pub fn parsed(&mut self) -> Result<&mut ParsedBody> {
        if self.parsed.is_none() {
            self.parse()?;
        }
        Ok(self.parsed.as_mut().unwrap())
    }

    /// Mutable SDP session, if this body is (or contains) one.
    pub fn sdp(&mut self) -> Result<Option<&mut sdp_rs::SessionDescription>> {
        match self.parsed()? {
            ParsedBody::Sdp(sdp) => Ok(Some(sdp)),
            ParsedBody::Generic(_) => Ok(None),
        }
    }

    fn parse(&mut self) -> Result<()> {
        self.parsed = Some(ParsedBody::Generic(self.string_content.clone()));
        if self.mtype.starts_with("multipart/mixed;") {
            let params = self.mtype.splitn(2, ';').nth(1).unwrap_or("");
            let boundary = params.split(';').find_map(|s| {
                let mut kv = s.splitn(2, '=');
                match (kv.next(), kv.next()) {
                    (Some(k), Some(v)) if k.trim() == "boundary" => Some(v.to_string()),
                    _ => None,
                }
            });
            let boundary = match boundary {
                Some(b) => format!("--{}", b),
                None => {
                    return Err(Error::Multipart(
                        "no boundary parameter in content type".to_string(),
                    ))
                }
            };
            let content = self.string_content.clone();
            for subsection in content.split(boundary.as_str()) {
                let subsection = subsection.trim();
                if subsection.is_empty() {
                    continue;
                }
                let split = ["\r\n\r\n", "\r\r", "\n\n"]
                    .iter()
                    .find_map(|d| subsection.find(d).map(|off| (off, d.len())));
                let (boff, dlen) = match split {
                    Some(s) => s,
                    None => continue,
                };
                let mbody = &subsection[boff + dlen..];
                let mut mtype = String::new();
                for line in subsection[..boff].split(['\r', '\n']) {
                    let tmp = line.trim().to_lowercase();
                    if let Some(v) = tmp.strip_prefix("content-type:") {
                        mtype = v.trim().to_string();
                    }
                }
                if mtype == "application/sdp" {
                    self.mtype = mtype;
                    self.string_content = mbody.to_string();
                    break;
                }
            }
        }
        if self.mtype == "application/sdp" {
            // multipart extraction trims the final CRLF off the sub-part
            let text = if self.string_content.ends_with('\n') {
                self.string_content.clone()
            } else {
                format!("{}\r\n", self.string_content)
            };
            match sdp_rs::SessionDescription::try_from(text.as_str()) {
                Ok(sdp) => self.parsed = Some(ParsedBody::Sdp(Box::new(sdp))),
                Err(e) => return Err(Error::Sdp(e.to_string())),
            }
        }
        Ok(())
    }

    /// Serialized body text.
    ///
    /// When a parsed view exists it is re-rendered and the cached string
    /// content refreshed, so edits through [`MsgBody::sdp`] show up on
    /// the wire.
    pub fn as_string(&mut self) -> String {
        if let Some(parsed) = &self.parsed {
            self.string_content = parsed.render();
        }
        self.string_content.clone()
    }

    /// Deep copy for retention across the UA boundary; the copy is
    /// flagged as needing an endpoint rewrite again.
    pub fn clone_body(&self) -> MsgBody {
        let mut copy = self.clone();
        copy.needs_update = true;
        copy
    }

    /// Append an `a=` attribute line.
    pub fn append_attribute(&mut self, hdr: &str) {
        match &mut self.parsed {
            Some(ParsedBody::Sdp(sdp)) => {
                let mut kv = hdr.splitn(2, ':');
                let key = kv.next().unwrap_or_default().to_string();
                let value = kv.next().map(|v| v.to_string());
                sdp.attributes
                    .push(sdp_rs::lines::Attribute::Other(key, value));
            }
            _ => {
                self.string_content.push_str("a=");
                self.string_content.push_str(hdr);
                self.string_content.push_str("\r\n");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP: &str = "v=0\r\n\
        o=alice 2890844526 2890844526 IN IP4 192.0.2.1\r\n\
        s=-\r\n\
        c=IN IP4 192.0.2.1\r\n\
        t=0 0\r\n\
        m=audio 49172 RTP/AVP 0\r\n\
        a=rtpmap:0 PCMU/8000\r\n";

    fn multipart(boundary: &str) -> String {
        format!(
            "--{b}\r\nContent-Type: text/plain\r\n\r\nhello\r\n\
             --{b}\r\nContent-Type: application/sdp\r\n\r\n{sdp}\r\n\
             --{b}--\r\n",
            b = boundary,
            sdp = SDP
        )
    }

    #[test]
    fn sdp_parse_is_lazy() {
        let mut body = MsgBody::new_sdp(SDP);
        assert!(body.parsed.is_none());
        assert!(body.needs_update());
        assert!(matches!(body.parsed().unwrap(), ParsedBody::Sdp(_)));
    }

    #[test]
    fn generic_body_passes_through() {
        let mut body = MsgBody::new("some text", "text/plain");
        assert!(matches!(body.parsed().unwrap(), ParsedBody::Generic(_)));
        assert_eq!(body.as_string(), "some text");
    }

    #[test]
    fn multipart_picks_first_sdp_part() {
        let content = multipart("outer");
        let mut body = MsgBody::new(content, "multipart/mixed;boundary=outer");
        assert!(matches!(body.parsed().unwrap(), ParsedBody::Sdp(_)));
        assert_eq!(body.mtype(), "application/sdp");

        // same result as parsing the part directly
        let mut direct = MsgBody::new_sdp(SDP);
        direct.parsed().unwrap();
        assert_eq!(body.as_string(), direct.as_string());
    }

    #[test]
    fn multipart_with_space_after_semicolon() {
        let content = multipart("b1");
        let mut body = MsgBody::new(content, "multipart/mixed; boundary=b1");
        assert!(matches!(body.parsed().unwrap(), ParsedBody::Sdp(_)));
    }

    #[test]
    fn multipart_without_boundary_fails() {
        let mut body = MsgBody::new("irrelevant", "multipart/mixed;charset=utf-8");
        match body.parsed() {
            Err(Error::Multipart(_)) => {}
            other => panic!("expected multipart error, got {:?}", other),
        }
    }

    #[test]
    fn as_string_refreshes_from_parsed() {
        let mut body = MsgBody::new_sdp(SDP);
        if let Some(sdp) = body.sdp().unwrap() {
            sdp.origin.username = "bob".to_string();
        }
        assert!(body.as_string().contains("o=bob "));
    }

    #[test]
    fn append_attribute_on_raw_and_parsed() {
        let mut raw = MsgBody::new_sdp(SDP);
        raw.append_attribute("sendrecv");
        assert!(raw.as_string().ends_with("a=sendrecv\r\n"));

        let mut parsed = MsgBody::new_sdp(SDP);
        parsed.parsed().unwrap();
        parsed.append_attribute("sendonly");
        assert!(parsed.as_string().contains("a=sendonly"));
    }

    #[test]
    fn copy_needs_update_again() {
        let mut body = MsgBody::new_sdp(SDP);
        body.set_needs_update(false);
        assert!(!body.needs_update());
        assert!(body.clone_body().needs_update());
    }
}
