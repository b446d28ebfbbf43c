//! XML helpers: element slicing and field-tag driven decoding.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stratus_core::{CloudError, CloudResult};

/// Locate `<tag ...>` (or `<tag/>`) and return (start of the tag, end of the opening tag, self-closing?).
fn find_open(xml: &str, tag: &str, from: usize) -> Option<(usize, usize, bool)> {
    let open = format!("<{}", tag);
    let mut search = from;
    while let Some(rel) = xml[search..].find(&open) {
        let start = search + rel;
        let after = start + open.len();
        match xml[after..].chars().next() {
            Some('>') => return Some((start, after + 1, false)),
            Some(c) if c == '/' || c.is_whitespace() => {
                let gt = xml[after..].find('>')? + after;
                let self_closing = xml[..gt].ends_with('/');
                return Some((start, gt + 1, self_closing));
            }
            _ => search = after,
        }
    }
    None
}

/// Text content of the first `<tag>` element, attributes allowed.
/// A self-closing element yields an empty string.
pub fn element_text(xml: &str, tag: &str) -> Option<String> {
    let (_, content_start, self_closing) = find_open(xml, tag, 0)?;
    if self_closing {
        return Some(String::new());
    }
    let close = format!("</{}>", tag);
    let end = xml[content_start..].find(&close)?;
    Some(unescape(&xml[content_start..content_start + end]))
}

/// The first `<tag>...</tag>` block including the tags themselves.
pub fn element_block<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let (start, content_start, self_closing) = find_open(xml, tag, 0)?;
    if self_closing {
        return Some(&xml[start..content_start]);
    }
    let close = format!("</{}>", tag);
    let end = xml[content_start..].find(&close)?;
    Some(&xml[start..content_start + end + close.len()])
}

fn unescape(text: &str) -> String {
    match quick_xml::escape::unescape(text) {
        Ok(s) => s.into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Decode an XML document (or fragment) into `T`.
///
/// The root element name is not checked; struct fields follow the element names.
pub fn decode<T: DeserializeOwned>(xml: &str) -> CloudResult<T> {
    quick_xml::de::from_str(xml).map_err(|e| CloudError::Codec(format!("xml decode: {}", e)))
}

/// Decode the `<{action}Result>` block of a Query-protocol response, or the
/// whole document when the service does not wrap results (EC2).
pub fn decode_result<T: DeserializeOwned>(xml: &str, action: &str) -> CloudResult<T> {
    let tag = format!("{}Result", action);
    match element_block(xml, &tag) {
        Some(block) => decode(block),
        None => decode(xml),
    }
}

/// `<wrapper><item>..</item>...</wrapper>` as used by EC2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSet<T> {
    #[serde(rename = "item", default = "Vec::new")]
    pub item: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { item: Vec::new() }
    }
}

/// `<wrapper><member>..</member>...</wrapper>` as used by IAM, STS, CloudWatch and ELB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberList<T> {
    #[serde(rename = "member", default = "Vec::new")]
    pub member: Vec<T>,
}

impl<T> Default for MemberList<T> {
    fn default() -> Self {
        Self { member: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_text_with_attributes() {
        let xml = r#"<LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">eu-west-1</LocationConstraint>"#;
        assert_eq!(element_text(xml, "LocationConstraint").as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn element_text_self_closing_is_empty() {
        let xml = r#"<?xml version="1.0"?><LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/"/>"#;
        assert_eq!(element_text(xml, "LocationConstraint").as_deref(), Some(""));
    }

    #[test]
    fn element_text_does_not_match_prefix() {
        let xml = "<Root><CodeName>x</CodeName><Code>real</Code></Root>";
        assert_eq!(element_text(xml, "Code").as_deref(), Some("real"));
    }

    #[test]
    fn element_text_unescapes() {
        let xml = "<Message>a &amp; b</Message>";
        assert_eq!(element_text(xml, "Message").as_deref(), Some("a & b"));
    }

    #[test]
    fn element_block_slices_nested() {
        let xml = "<R><GetUserResult><User><UserName>u</UserName></User></GetUserResult><ResponseMetadata/></R>";
        assert_eq!(
            element_block(xml, "GetUserResult"),
            Some("<GetUserResult><User><UserName>u</UserName></User></GetUserResult>")
        );
    }

    #[derive(Debug, Deserialize)]
    struct Zones {
        #[serde(rename = "availabilityZoneInfo", default)]
        zones: ItemSet<Zone>,
    }

    #[derive(Debug, Deserialize)]
    struct Zone {
        #[serde(rename = "zoneName")]
        name: String,
    }

    #[test]
    fn decode_item_set() {
        let xml = r#"<DescribeAvailabilityZonesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
  <requestId>r</requestId>
  <availabilityZoneInfo>
    <item><zoneName>us-east-1a</zoneName></item>
    <item><zoneName>us-east-1b</zoneName></item>
  </availabilityZoneInfo>
</DescribeAvailabilityZonesResponse>"#;
        let out: Zones = decode(xml).unwrap();
        let names: Vec<_> = out.zones.item.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, ["us-east-1a", "us-east-1b"]);
    }

    #[test]
    fn decode_empty_item_set() {
        let xml = "<R><availabilityZoneInfo/></R>";
        let out: Zones = decode(xml).unwrap();
        assert!(out.zones.item.is_empty());
    }

    #[derive(Debug, Deserialize)]
    struct Identity {
        #[serde(rename = "Account")]
        account: String,
    }

    #[test]
    fn decode_result_block() {
        let xml = r#"<GetCallerIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <GetCallerIdentityResult><Arn>arn:aws:iam::123:user/u</Arn><UserId>AID</UserId><Account>123</Account></GetCallerIdentityResult>
  <ResponseMetadata><RequestId>r</RequestId></ResponseMetadata>
</GetCallerIdentityResponse>"#;
        let id: Identity = decode_result(xml, "GetCallerIdentity").unwrap();
        assert_eq!(id.account, "123");
    }

    #[test]
    fn decode_reports_codec_error() {
        let err = decode::<Identity>("<R><Other/></R>").unwrap_err();
        assert_eq!(err.kind(), stratus_core::ErrorKind::Codec);
    }
}
