//! WS-Discovery probing and DPWS metadata retrieval.
//!
//! A SOAP 1.2 Probe goes out over UDP multicast; each ProbeMatch names an
//! HTTP endpoint (XAddrs) that serves device metadata through a WS-Transfer
//! Get. The 3DS answers both, and its metadata carries the NetBIOS name the
//! SMB session request needs.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::discovery::xml::XmlScan;
use crate::error::{Error, NetworkError, Result};

/// WS-Discovery multicast group and port.
pub const WSD_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const WSD_PORT: u16 = 3702;
/// Default DPWS metadata port when the XAddrs URL omits one.
pub const DPWS_DEFAULT_PORT: u16 = 5357;

// Namespaces used by the envelopes.
pub const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const NS_WSA: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
pub const NS_WSD: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery";
pub const NS_DEVPROF: &str = "http://schemas.xmlsoap.org/ws/2006/02/devprof";
pub const NS_PUB: &str = "http://schemas.microsoft.com/windows/pub/2005/07";

const ACTION_PROBE: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";
const ACTION_TRANSFER_GET: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Get";

/// Build the multicast Probe envelope. `message_id` is a `urn:uuid:` URN and
/// must be matched against `RelatesTo` in every response.
pub fn probe_envelope(message_id: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope"#,
            r#" xmlns:soap="http://www.w3.org/2003/05/soap-envelope""#,
            r#" xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing""#,
            r#" xmlns:wsd="http://schemas.xmlsoap.org/ws/2005/04/discovery""#,
            r#" xmlns:wsdp="http://schemas.xmlsoap.org/ws/2006/02/devprof""#,
            r#" xmlns:pub="http://schemas.microsoft.com/windows/pub/2005/07">"#,
            r#"<soap:Header>"#,
            r#"<wsa:To>urn:schemas-xmlsoap-org:ws:2005:04:discovery</wsa:To>"#,
            r#"<wsa:Action>{action}</wsa:Action>"#,
            r#"<wsa:MessageID>{mid}</wsa:MessageID>"#,
            r#"</soap:Header>"#,
            r#"<soap:Body>"#,
            r#"<wsd:Probe><wsd:Types>wsdp:Device pub:Computer</wsd:Types></wsd:Probe>"#,
            r#"</soap:Body>"#,
            r#"</soap:Envelope>"#
        ),
        action = ACTION_PROBE,
        mid = message_id,
    )
}

/// Build the WS-Transfer Get envelope posted to an XAddrs endpoint.
pub fn metadata_envelope(endpoint: &str, message_id: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<soap:Envelope"#,
            r#" xmlns:soap="http://www.w3.org/2003/05/soap-envelope""#,
            r#" xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing">"#,
            r#"<soap:Header>"#,
            r#"<wsa:To>{endpoint}</wsa:To>"#,
            r#"<wsa:Action>{action}</wsa:Action>"#,
            r#"<wsa:MessageID>{mid}</wsa:MessageID>"#,
            r#"<wsa:ReplyTo>"#,
            r#"<wsa:Address>http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</wsa:Address>"#,
            r#"</wsa:ReplyTo>"#,
            r#"</soap:Header>"#,
            r#"<soap:Body/>"#,
            r#"</soap:Envelope>"#
        ),
        endpoint = endpoint,
        action = ACTION_TRANSFER_GET,
        mid = message_id,
    )
}

/// One ProbeMatch: the device's stable endpoint URN plus its metadata URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeMatch {
    pub endpoint: String,
    pub xaddrs: Vec<String>,
}

/// Parse a ProbeMatches envelope.
///
/// Envelopes whose `RelatesTo` does not name the Probe we sent are stray
/// multicast cross-talk and are rejected outright.
pub fn parse_probe_match(body: &str, sent_message_id: &str) -> Option<ProbeMatch> {
    let scan = XmlScan::parse(body);

    let action = scan.first_text(NS_WSA, "Action")?;
    if !action.contains("ProbeMatches") {
        return None;
    }
    let relates_to = scan.first_text(NS_WSA, "RelatesTo")?;
    if relates_to != sent_message_id {
        trace!(relates_to, "ignoring envelope for someone else's probe");
        return None;
    }

    let endpoint = scan.first_text(NS_WSA, "Address")?.to_string();
    let xaddrs: Vec<String> = scan
        .first_text(NS_WSD, "XAddrs")?
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if endpoint.is_empty() || xaddrs.is_empty() {
        return None;
    }

    Some(ProbeMatch { endpoint, xaddrs })
}

/// Device description pulled from DPWS metadata.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// `pub:Computer`, formatted `NAME/Workgroup`.
    pub computer: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
}

impl DeviceMetadata {
    pub fn parse(body: &str) -> Self {
        let scan = XmlScan::parse(body);
        let grab = |ns: &str, local: &str| {
            scan.first_text(ns, local)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };
        DeviceMetadata {
            computer: grab(NS_PUB, "Computer"),
            friendly_name: grab(NS_DEVPROF, "FriendlyName"),
            manufacturer: grab(NS_DEVPROF, "Manufacturer"),
        }
    }

    /// True if the metadata describes a 3DS.
    pub fn is_3ds(&self) -> bool {
        self.manufacturer.as_deref().is_some_and(|m| m.contains("Nintendo"))
            || self.friendly_name.as_deref().is_some_and(|f| f.contains("3DS"))
    }

    /// Recover the NetBIOS name: `pub:Computer` is `NAME/Workgroup`; failing
    /// that, the FriendlyName with any `Vendor:` prefix stripped. Upper-cased
    /// either way, since that is how the console registers itself.
    pub fn netbios_name(&self) -> Option<String> {
        if let Some(computer) = &self.computer {
            let name = computer.split('/').next().unwrap_or(computer).trim();
            if !name.is_empty() {
                return Some(name.to_uppercase());
            }
        }
        if let Some(friendly) = &self.friendly_name {
            let name = friendly.rsplit(':').next().unwrap_or(friendly).trim();
            if !name.is_empty() {
                return Some(name.to_uppercase());
            }
        }
        None
    }
}

/// A parsed XAddrs URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XAddr {
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Parse `http://host[:port][/path]`.
pub fn parse_xaddr(url: &str) -> Option<XAddr> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))?;
    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], &rest[slash..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (authority, DPWS_DEFAULT_PORT),
    };
    if host.is_empty() {
        return None;
    }
    Some(XAddr {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// POST a WS-Transfer Get to the responder and return the SOAP body.
///
/// Connects to the ProbeMatch's source IP (not whatever host the URL names);
/// the URL only contributes the port and path.
pub async fn fetch_metadata(
    ip: Ipv4Addr,
    xaddr: &XAddr,
    endpoint: &str,
    message_id: &str,
    budget: Duration,
) -> Result<String> {
    let body = metadata_envelope(endpoint, message_id);
    let request = format!(
        "POST {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Content-Type: application/soap+xml; charset=utf-8\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        path = xaddr.path,
        host = xaddr.host,
        port = xaddr.port,
        len = body.len(),
        body = body,
    );

    let exchange = async {
        let mut stream = TcpStream::connect((ip, xaddr.port)).await?;
        stream.write_all(request.as_bytes()).await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok::<_, std::io::Error>(response)
    };

    let response = match timeout(budget, exchange).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(Error::Network(NetworkError::Timeout)),
    };

    let text = String::from_utf8_lossy(&response);
    let xml_start = text
        .find("<?xml")
        .or_else(|| text.find("\r\n\r\n").map(|i| i + 4))
        .ok_or_else(|| Error::Protocol("no XML body in metadata response".into()))?;
    debug!(ip = %ip, port = xaddr.port, bytes = response.len(), "fetched metadata");
    Ok(text[xml_start..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MID: &str = "urn:uuid:11111111-2222-3333-4444-555555555555";

    fn probe_matches_body(relates_to: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
            <soap:Envelope xmlns:soap="{soap}" xmlns:wsa="{wsa}" xmlns:wsd="{wsd}">
              <soap:Header>
                <wsa:Action>{wsd}/ProbeMatches</wsa:Action>
                <wsa:RelatesTo>{relates}</wsa:RelatesTo>
              </soap:Header>
              <soap:Body>
                <wsd:ProbeMatches>
                  <wsd:ProbeMatch>
                    <wsa:EndpointReference><wsa:Address>urn:uuid:device-1</wsa:Address></wsa:EndpointReference>
                    <wsd:XAddrs>http://192.168.1.20:5357/meta</wsd:XAddrs>
                  </wsd:ProbeMatch>
                </wsd:ProbeMatches>
              </soap:Body>
            </soap:Envelope>"#,
            soap = NS_SOAP,
            wsa = NS_WSA,
            wsd = NS_WSD,
            relates = relates_to,
        )
    }

    #[test]
    fn test_probe_envelope_declares_action_and_id() {
        let env = probe_envelope(MID);
        assert!(env.contains(ACTION_PROBE));
        assert!(env.contains(MID));
        assert!(env.contains("wsd:Probe"));
    }

    #[test]
    fn test_metadata_envelope_targets_endpoint() {
        let env = metadata_envelope("urn:uuid:device-1", MID);
        assert!(env.contains(ACTION_TRANSFER_GET));
        assert!(env.contains("<wsa:To>urn:uuid:device-1</wsa:To>"));
    }

    #[test]
    fn test_parse_probe_match() {
        let m = parse_probe_match(&probe_matches_body(MID), MID).unwrap();
        assert_eq!(m.endpoint, "urn:uuid:device-1");
        assert_eq!(m.xaddrs, vec!["http://192.168.1.20:5357/meta"]);
    }

    #[test]
    fn test_probe_match_rejects_foreign_relates_to() {
        let body = probe_matches_body("urn:uuid:someone-else");
        assert!(parse_probe_match(&body, MID).is_none());
    }

    #[test]
    fn test_probe_match_rejects_other_actions() {
        let body = probe_matches_body(MID).replace("ProbeMatches", "Hello");
        assert!(parse_probe_match(&body, MID).is_none());
    }

    #[test]
    fn test_parse_xaddr_forms() {
        assert_eq!(
            parse_xaddr("http://192.168.1.20:5357/meta"),
            Some(XAddr { host: "192.168.1.20".into(), port: 5357, path: "/meta".into() })
        );
        assert_eq!(
            parse_xaddr("http://192.168.1.20"),
            Some(XAddr { host: "192.168.1.20".into(), port: DPWS_DEFAULT_PORT, path: "/".into() })
        );
        assert!(parse_xaddr("ftp://x/").is_none());
        assert!(parse_xaddr("http://").is_none());
    }

    #[test]
    fn test_metadata_name_from_computer_element() {
        let body = format!(
            r#"<e xmlns:pub="{p}" xmlns:wsdp="{dp}">
                 <wsdp:Manufacturer>Nintendo</wsdp:Manufacturer>
                 <wsdp:FriendlyName>Nintendo 3DS</wsdp:FriendlyName>
                 <pub:Computer>my3ds/Workgroup:WORKGROUP</pub:Computer>
               </e>"#,
            p = NS_PUB,
            dp = NS_DEVPROF,
        );
        let meta = DeviceMetadata::parse(&body);
        assert!(meta.is_3ds());
        assert_eq!(meta.netbios_name().as_deref(), Some("MY3DS"));
    }

    #[test]
    fn test_metadata_name_falls_back_to_friendly_name() {
        let body = format!(
            r#"<e xmlns:wsdp="{dp}"><wsdp:FriendlyName>Nintendo 3DS: my3ds</wsdp:FriendlyName></e>"#,
            dp = NS_DEVPROF,
        );
        let meta = DeviceMetadata::parse(&body);
        assert!(meta.is_3ds());
        assert_eq!(meta.netbios_name().as_deref(), Some("MY3DS"));
    }

    #[test]
    fn test_metadata_without_name() {
        let meta = DeviceMetadata::parse("<e/>");
        assert!(!meta.is_3ds());
        assert_eq!(meta.netbios_name(), None);
    }
}
