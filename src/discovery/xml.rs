//! Minimal namespace-aware XML element extraction.
//!
//! WS-Discovery and DPWS envelopes are tiny and predictable; this scanner
//! pulls element text out by (namespace URI, local name) without a full XML
//! stack. It tolerates arbitrary element order, unknown elements, and the
//! malformed neighbours that share a multicast group.

use std::collections::HashMap;

/// One element seen during the scan, with its resolved namespace and the
/// character data collected from its subtree.
#[derive(Debug, Clone)]
struct ScannedElement {
    ns: String,
    local: String,
    text: String,
}

/// Flat scan of a document, queryable by qualified name.
#[derive(Debug)]
pub struct XmlScan {
    elements: Vec<ScannedElement>,
}

impl XmlScan {
    /// Scan a document. Never fails: whatever could be recognized is kept.
    pub fn parse(xml: &str) -> Self {
        let mut elements: Vec<ScannedElement> = Vec::new();
        // (element index, prefix map introduced at this depth)
        let mut stack: Vec<(usize, HashMap<String, String>)> = Vec::new();
        let mut rest = xml;

        while let Some(lt) = rest.find('<') {
            // character data before the tag belongs to every open element
            let text = &rest[..lt];
            if !text.trim().is_empty() {
                let decoded = decode_entities(text.trim());
                for (idx, _) in &stack {
                    let el = &mut elements[*idx];
                    if !el.text.is_empty() {
                        el.text.push(' ');
                    }
                    el.text.push_str(&decoded);
                }
            }
            rest = &rest[lt + 1..];

            if let Some(stripped) = rest.strip_prefix("!--") {
                match stripped.find("-->") {
                    Some(end) => rest = &stripped[end + 3..],
                    None => break,
                }
                continue;
            }
            if rest.starts_with('?') || rest.starts_with('!') {
                match rest.find('>') {
                    Some(end) => rest = &rest[end + 1..],
                    None => break,
                }
                continue;
            }

            let Some(gt) = rest.find('>') else { break };
            let tag = &rest[..gt];
            rest = &rest[gt + 1..];

            if let Some(name) = tag.strip_prefix('/') {
                // closing tag: pop back to the innermost open element with
                // this local name (lenient towards mismatched prefixes)
                let (_, local) = split_qname(name.trim());
                if let Some(pos) = stack
                    .iter()
                    .rposition(|(idx, _)| elements[*idx].local == local)
                {
                    stack.truncate(pos);
                }
                continue;
            }

            let self_closing = tag.ends_with('/');
            let tag = tag.trim_end_matches('/');
            let mut parts = tag.splitn(2, char::is_whitespace);
            let qname = parts.next().unwrap_or("");
            let attrs = parts.next().unwrap_or("");

            let mut scope = HashMap::new();
            for (key, value) in parse_attrs(attrs) {
                if key == "xmlns" {
                    scope.insert(String::new(), value);
                } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                    scope.insert(prefix.to_string(), value);
                }
            }

            let (prefix, local) = split_qname(qname);
            let ns = resolve(&stack, &scope, prefix);

            elements.push(ScannedElement {
                ns,
                local: local.to_string(),
                text: String::new(),
            });
            if !self_closing {
                stack.push((elements.len() - 1, scope));
            }
        }

        XmlScan { elements }
    }

    /// Text of the first element matching (namespace, local name).
    pub fn first_text(&self, ns: &str, local: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.ns == ns && e.local == local)
            .map(|e| e.text.as_str())
    }

    /// Texts of every element matching (namespace, local name).
    pub fn all_texts(&self, ns: &str, local: &str) -> Vec<&str> {
        self.elements
            .iter()
            .filter(|e| e.ns == ns && e.local == local)
            .map(|e| e.text.as_str())
            .collect()
    }
}

/// Split `prefix:local` into its parts; no colon means the default namespace.
fn split_qname(qname: &str) -> (&str, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", qname),
    }
}

/// Resolve `prefix` against the innermost declaration in scope.
fn resolve(
    stack: &[(usize, HashMap<String, String>)],
    current: &HashMap<String, String>,
    prefix: &str,
) -> String {
    if let Some(uri) = current.get(prefix) {
        return uri.clone();
    }
    for (_, scope) in stack.iter().rev() {
        if let Some(uri) = scope.get(prefix) {
            return uri.clone();
        }
    }
    String::new()
}

/// Parse `key="value"` attribute pairs, tolerating single quotes.
fn parse_attrs(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = input;
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].trim_start();
        let Some(quote) = rest.chars().next() else { break };
        if quote != '"' && quote != '\'' {
            break;
        }
        rest = &rest[1..];
        let Some(end) = rest.find(quote) else { break };
        out.push((key, decode_entities(&rest[..end])));
        rest = &rest[end + 1..];
    }
    out
}

/// Decode the five predefined XML entities.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
