use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;

use super::types::{Holding, ParseDiagnostic, ParsedHoldings};

pub const ENTRY_TAG: &str = "invstOrSec";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Cusip,
    Balance,
    Value,
}

impl Field {
    const ALL: [Field; 4] = [Field::Title, Field::Cusip, Field::Balance, Field::Value];

    fn tag(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Cusip => "cusip",
            Field::Balance => "balance",
            Field::Value => "valUSD",
        }
    }

    fn from_tag(local: &[u8]) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.tag().as_bytes() == local)
    }

    fn slot(self, holding: &mut Holding) -> &mut Option<String> {
        match self {
            Field::Title => &mut holding.title,
            Field::Cusip => &mut holding.cusip,
            Field::Balance => &mut holding.balance,
            Field::Value => &mut holding.value,
        }
    }
}

/// Extracts every `invstOrSec` entry from an N-PORT primary document.
///
/// The document is first parsed strictly. EDGAR occasionally serves markup
/// that is not well-formed, so when the strict parse fails a recovering
/// streaming pass picks up whatever entries it can and records what went
/// wrong in `diagnostics`. This never fails; the worst case is an empty list.
pub fn parse_holdings(content: &[u8]) -> ParsedHoldings {
    let mut diagnostics = Vec::new();

    let text = String::from_utf8_lossy(content);
    if let Cow::Owned(_) = text {
        diagnostics.push(ParseDiagnostic::new(
            "document is not valid UTF-8; invalid bytes were replaced",
        ));
    }
    let text = text.trim_start_matches('\u{feff}').trim_start();

    match roxmltree::Document::parse(text) {
        Ok(document) => ParsedHoldings {
            holdings: holdings_from_tree(&document),
            diagnostics,
        },
        Err(e) => {
            diagnostics.push(ParseDiagnostic::new(format!(
                "strict XML parse failed, recovering: {}",
                e
            )));
            let holdings = recover_holdings(text, &mut diagnostics);
            ParsedHoldings {
                holdings,
                diagnostics,
            }
        }
    }
}

fn holdings_from_tree(document: &roxmltree::Document) -> Vec<Holding> {
    let root = document.root_element();
    let namespace = root.lookup_namespace_uri(None);

    let is_tag = |node: &roxmltree::Node, tag: &str| {
        node.is_element()
            && node.tag_name().name() == tag
            && node.tag_name().namespace() == namespace
    };

    root.descendants()
        .filter(|node| is_tag(node, ENTRY_TAG))
        .map(|entry| {
            let mut holding = Holding::default();
            for field in Field::ALL {
                *field.slot(&mut holding) = entry
                    .children()
                    .find(|child| is_tag(child, field.tag()))
                    .map(|child| child.text().unwrap_or_default().to_string());
            }
            holding
        })
        .collect()
}

/// An element the recovery pass believes is still open.
struct OpenElement {
    name: Vec<u8>,
    /// `xmlns` and `xmlns:p` declarations made on this element.
    bindings: Vec<(Vec<u8>, Vec<u8>)>,
}

fn split_qname(qname: &[u8]) -> (&[u8], &[u8]) {
    match qname.iter().position(|&b| b == b':') {
        Some(colon) => (&qname[..colon], &qname[colon + 1..]),
        None => (&qname[..0], qname),
    }
}

fn declarations(start: &BytesStart) -> Vec<(Vec<u8>, Vec<u8>)> {
    start
        .attributes()
        .with_checks(false)
        .flatten()
        .filter_map(|attr| {
            let key = attr.key.as_ref();
            let prefix = if key == b"xmlns" {
                Vec::new()
            } else {
                key.strip_prefix(b"xmlns:")?.to_vec()
            };
            Some((prefix, attr.value.into_owned()))
        })
        .collect()
}

/// Whether an element with `prefix` resolves to `expected`, looking at its own
/// declarations first and then at every element still open.
fn resolves_to(
    stack: &[OpenElement],
    own: &[(Vec<u8>, Vec<u8>)],
    prefix: &[u8],
    expected: Option<&[u8]>,
) -> bool {
    let bound = own
        .iter()
        .chain(stack.iter().rev().flat_map(|open| open.bindings.iter()))
        .find(|(p, _)| p.as_slice() == prefix)
        .map(|(_, uri)| uri.as_slice())
        .filter(|uri| !uri.is_empty());
    match bound {
        Some(uri) => expected == Some(uri),
        None => prefix.is_empty() && expected.is_none(),
    }
}

/// Escapes every `<` that cannot begin markup so text like `A < B` reaches the
/// reader as text. CDATA sections are left alone.
fn escape_stray_angles(text: &str) -> (Cow<'_, str>, usize) {
    const CDATA_OPEN: &str = "<![CDATA[";

    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut copied = 0;
    let mut escaped = 0;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('<') {
        let at = cursor + offset;
        if text[at..].starts_with(CDATA_OPEN) {
            cursor = text[at..].find("]]>").map_or(text.len(), |end| at + end + 3);
            continue;
        }
        let starts_markup = bytes.get(at + 1).is_some_and(|&b| {
            b.is_ascii_alphabetic() || matches!(b, b'_' | b':' | b'/' | b'!' | b'?') || !b.is_ascii()
        });
        if !starts_markup {
            out.push_str(&text[copied..at]);
            out.push_str("&lt;");
            copied = at + 1;
            escaped += 1;
        }
        cursor = at + 1;
    }

    if escaped == 0 {
        return (Cow::Borrowed(text), 0);
    }
    out.push_str(&text[copied..]);
    (Cow::Owned(out), escaped)
}

/// Resolves predefined and numeric references and keeps anything else (a
/// bare `&`, an unknown entity) as written.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let resolved = after
            .find(';')
            .and_then(|semi| resolve_reference(&after[..semi]).map(|text| (text, semi + 1)));
        match resolved {
            Some((text, consumed)) => {
                out.push_str(&text);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_reference(name: &str) -> Option<Cow<'static, str>> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse().ok()?,
        };
        return char::from_u32(value).map(|c| Cow::Owned(c.to_string()));
    }
    resolve_predefined_entity(name).map(Cow::Borrowed)
}

struct OpenEntry {
    holding: Holding,
    /// Stack index of the `invstOrSec` element.
    base: usize,
    /// Field being read and the stack index of its element.
    field: Option<(Field, usize)>,
    text: String,
}

impl OpenEntry {
    fn new(base: usize) -> Self {
        Self {
            holding: Holding::default(),
            base,
            field: None,
            text: String::new(),
        }
    }

    fn commit_field(&mut self) {
        if let Some((field, _)) = self.field.take() {
            let slot = field.slot(&mut self.holding);
            if slot.is_none() {
                *slot = Some(std::mem::take(&mut self.text));
            }
        }
        self.text.clear();
    }

    fn finish(mut self) -> Holding {
        self.commit_field();
        self.holding
    }
}

/// Streaming pass for documents the strict parser rejected.
///
/// Open elements live on a name stack. An end tag closes back to the nearest
/// open element of that name and is dropped if none is open. A new
/// `invstOrSec` or a sibling field closes whatever the previous one left open.
fn recover_holdings(text: &str, diagnostics: &mut Vec<ParseDiagnostic>) -> Vec<Holding> {
    let (text, escaped) = escape_stray_angles(text);
    if escaped > 0 {
        diagnostics.push(ParseDiagnostic::new(format!(
            "treated {} stray '<' as text",
            escaped
        )));
    }

    let mut reader = Reader::from_str(&text);
    {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = true;
    }

    let mut holdings = Vec::new();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut namespace: Option<Option<Vec<u8>>> = None;
    let mut entry: Option<OpenEntry> = None;
    let mut reported_escape = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let position = reader.buffer_position();
                let name = e.name().as_ref().to_vec();
                let bindings = declarations(&e);
                let expected = namespace
                    .get_or_insert_with(|| {
                        bindings
                            .iter()
                            .find(|(prefix, uri)| prefix.is_empty() && !uri.is_empty())
                            .map(|(_, uri)| uri.clone())
                    })
                    .as_deref();
                let (prefix, local) = split_qname(&name);
                let in_namespace = resolves_to(&stack, &bindings, prefix, expected);

                if in_namespace && local == ENTRY_TAG.as_bytes() {
                    if let Some(open) = entry.take() {
                        diagnostics.push(ParseDiagnostic::at(
                            format!("<{}> opened before the previous one closed", ENTRY_TAG),
                            position,
                        ));
                        stack.truncate(open.base);
                        holdings.push(open.finish());
                    }
                    entry = Some(OpenEntry::new(stack.len()));
                } else if let Some(open) = entry.as_mut() {
                    let field = Field::from_tag(local).filter(|_| in_namespace);
                    if let (Some(_), Some((current, index))) = (field, open.field) {
                        diagnostics.push(ParseDiagnostic::at(
                            format!("<{}> was never closed", current.tag()),
                            position,
                        ));
                        stack.truncate(index);
                        open.commit_field();
                    }
                    if let Some(field) = field {
                        if stack.len() == open.base + 1 {
                            open.field = Some((field, stack.len()));
                            open.text.clear();
                        }
                    }
                }

                stack.push(OpenElement { name, bindings });
            }
            Ok(Event::Text(t)) => {
                let Some(open) = entry.as_mut() else { continue };
                if !open.field.is_some_and(|(_, index)| index + 1 == stack.len()) {
                    continue;
                }
                match t.unescape() {
                    Ok(unescaped) => open.text.push_str(&unescaped),
                    Err(e) => {
                        if !reported_escape {
                            diagnostics.push(ParseDiagnostic::at(
                                format!("kept unresolved references as text: {}", e),
                                reader.buffer_position(),
                            ));
                            reported_escape = true;
                        }
                        open.text.push_str(&unescape_lenient(&String::from_utf8_lossy(&t)));
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(open) = entry.as_mut() {
                    if open.field.is_some_and(|(_, index)| index + 1 == stack.len()) {
                        open.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
            }
            Ok(Event::End(e)) => {
                let position = reader.buffer_position();
                let name = e.name();
                let Some(index) = stack.iter().rposition(|open| open.name == name.as_ref()) else {
                    diagnostics.push(ParseDiagnostic::at(
                        format!("ignored stray </{}>", String::from_utf8_lossy(name.as_ref())),
                        position,
                    ));
                    continue;
                };
                if index + 1 < stack.len() {
                    diagnostics.push(ParseDiagnostic::at(
                        format!(
                            "</{}> closed {} unclosed element(s)",
                            String::from_utf8_lossy(name.as_ref()),
                            stack.len() - index - 1
                        ),
                        position,
                    ));
                }
                stack.truncate(index);

                if let Some(open) = entry.as_mut() {
                    if open.field.is_some_and(|(_, field_index)| field_index >= index) {
                        open.commit_field();
                    }
                    if open.base >= index {
                        if let Some(done) = entry.take() {
                            holdings.push(done.finish());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                diagnostics.push(ParseDiagnostic::at(
                    format!("stopped at unrecoverable markup: {}", e),
                    reader.error_position(),
                ));
                break;
            }
        }
    }

    if let Some(open) = entry.take() {
        diagnostics.push(ParseDiagnostic::new(format!(
            "document ended inside <{}>; kept the partial entry",
            ENTRY_TAG
        )));
        holdings.push(open.finish());
    }

    holdings
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ENTRIES: &str = r#"
    <report xmlns="http://www.sec.gov/edgar/nport">
        <holdings>
            <invstOrSec>
                <title>Company A Bond</title>
                <cusip>123456789</cusip>
                <balance>1000</balance>
                <valUSD>10000</valUSD>
            </invstOrSec>
            <invstOrSec>
                <title>Company B Stock</title>
                <cusip>987654321</cusip>
                <balance>500</balance>
                <valUSD>5000</valUSD>
            </invstOrSec>
        </holdings>
    </report>
    "#;

    fn full(title: &str, cusip: &str, balance: &str, value: &str) -> Holding {
        Holding {
            title: Some(title.to_string()),
            cusip: Some(cusip.to_string()),
            balance: Some(balance.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn well_formed_document_yields_entries_in_order() {
        let parsed = parse_holdings(TWO_ENTRIES.as_bytes());
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(
            parsed.holdings,
            vec![
                full("Company A Bond", "123456789", "1000", "10000"),
                full("Company B Stock", "987654321", "500", "5000"),
            ]
        );
    }

    #[test]
    fn missing_children_are_none() {
        let xml = r#"<edgarSubmission xmlns="http://www.sec.gov/edgar/nport">
            <invstOrSec><title>Only Title</title></invstOrSec>
            <invstOrSec><valUSD>12.5</valUSD><cusip></cusip></invstOrSec>
        </edgarSubmission>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("Only Title"));
        assert_eq!(parsed.holdings[0].value, None);
        assert_eq!(parsed.holdings[1].title, None);
        assert_eq!(parsed.holdings[1].cusip.as_deref(), Some(""));
        assert_eq!(parsed.holdings[1].value.as_deref(), Some("12.5"));
    }

    #[test]
    fn elements_outside_default_namespace_are_ignored() {
        let xml = r#"<edgarSubmission xmlns="http://www.sec.gov/edgar/nport"
                                      xmlns:other="urn:other">
            <other:invstOrSec><title>Foreign</title></other:invstOrSec>
            <invstOrSec><title>Native</title><other:valUSD>1</other:valUSD></invstOrSec>
        </edgarSubmission>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings.len(), 1);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("Native"));
        assert_eq!(parsed.holdings[0].value, None);
    }

    #[test]
    fn no_namespace_matches_plain_elements() {
        let xml = "<report><invstOrSec><title>Plain</title></invstOrSec></report>";
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings.len(), 1);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("Plain"));
    }

    #[test]
    fn first_child_wins() {
        let xml = "<r><invstOrSec><title>First</title><title>Second</title></invstOrSec></r>";
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("First"));
    }

    #[test]
    fn nested_descendants_are_not_fields() {
        let xml = "<r><invstOrSec><identifiers><title>Deep</title></identifiers>\
                   <title>Shallow</title></invstOrSec></r>";
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("Shallow"));
    }

    #[test]
    fn no_entries_is_empty_not_an_error() {
        let parsed = parse_holdings(b"<report xmlns=\"urn:x\"><genInfo/></report>");
        assert!(parsed.holdings.is_empty());
        assert!(parsed.is_clean());
    }

    #[test]
    fn recovers_from_bare_ampersand() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>AT&T Inc</title><valUSD>10</valUSD></invstOrSec>
            <invstOrSec><title>Procter &amp; Gamble</title><valUSD>20</valUSD></invstOrSec>
        </report>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert!(!parsed.is_clean());
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("AT&T Inc"));
        assert_eq!(parsed.holdings[1].title.as_deref(), Some("Procter & Gamble"));
        assert_eq!(parsed.holdings[1].value.as_deref(), Some("20"));
    }

    #[test]
    fn recovers_from_mismatched_end_tags() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>Good</title><cusip>1</cusp><valUSD>5</valUSD></invstOrSec>
            <invstOrSec><title>Also Good</title></invstOrSec>
        </report>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert!(!parsed.is_clean());
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].cusip.as_deref(), Some("1"));
        assert_eq!(parsed.holdings[0].value.as_deref(), Some("5"));
        assert_eq!(parsed.holdings[1].title.as_deref(), Some("Also Good"));
    }

    #[test]
    fn truncated_document_keeps_complete_entries() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>Complete</title><valUSD>1</valUSD></invstOrSec>
            <invstOrSec><title>Cut off"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert!(!parsed.is_clean());
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("Complete"));
        assert_eq!(parsed.holdings[1].title.as_deref(), Some("Cut off"));
    }

    #[test]
    fn unclosed_tag_in_text_does_not_swallow_later_entries() {
        let xml = r#"<edgarSubmission xmlns="http://www.sec.gov/edgar/nport">
            <invstOrSec><title>Fund <Class A></title><cusip>111111111</cusip><balance>1</balance><valUSD>100</valUSD></invstOrSec>
            <invstOrSec><title>Second</title><cusip>222222222</cusip><balance>2</balance><valUSD>200</valUSD></invstOrSec>
            <invstOrSec><title>Third</title><cusip>333333333</cusip><balance>3</balance><valUSD>300</valUSD></invstOrSec>
        </edgarSubmission>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert!(!parsed.is_clean());
        assert_eq!(
            parsed.holdings,
            vec![
                full("Fund ", "111111111", "1", "100"),
                full("Second", "222222222", "2", "200"),
                full("Third", "333333333", "3", "300"),
            ]
        );
    }

    #[test]
    fn bare_less_than_is_kept_as_text() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>A < B</title><cusip>1</cusip><valUSD>100</valUSD></invstOrSec>
            <invstOrSec><title>Second</title><valUSD>200</valUSD></invstOrSec>
        </report>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert!(!parsed.is_clean());
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("A < B"));
        assert_eq!(parsed.holdings[0].cusip.as_deref(), Some("1"));
        assert_eq!(parsed.holdings[0].value.as_deref(), Some("100"));
        assert_eq!(parsed.holdings[1].title.as_deref(), Some("Second"));
        assert_eq!(parsed.holdings[1].value.as_deref(), Some("200"));
    }

    #[test]
    fn stray_end_tag_is_ignored() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>First</title></junk><cusip>1</cusip><valUSD>10</valUSD></invstOrSec>
            <invstOrSec><title>Second</title><valUSD>20</valUSD></invstOrSec>
        </report>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert!(parsed
            .diagnostics
            .iter()
            .any(|d| d.message.contains("stray </junk>")));
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].cusip.as_deref(), Some("1"));
        assert_eq!(parsed.holdings[0].value.as_deref(), Some("10"));
        assert_eq!(parsed.holdings[1].title.as_deref(), Some("Second"));
        assert_eq!(parsed.holdings[1].value.as_deref(), Some("20"));
    }

    #[test]
    fn unclosed_entry_is_closed_by_the_next_one() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>Open</title><valUSD>1</valUSD>
            <invstOrSec><title>Closed</title><valUSD>2</valUSD></invstOrSec>
        </report>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings.len(), 2);
        assert_eq!(parsed.holdings[0].title.as_deref(), Some("Open"));
        assert_eq!(parsed.holdings[0].value.as_deref(), Some("1"));
        assert_eq!(parsed.holdings[1].title.as_deref(), Some("Closed"));
    }

    #[test]
    fn unclosed_field_is_closed_by_its_sibling() {
        let xml = r#"<report xmlns="urn:nport">
            <invstOrSec><title>No end<cusip>9</cusip><valUSD>3</valUSD></invstOrSec>
        </report>"#;
        let parsed = parse_holdings(xml.as_bytes());
        assert_eq!(parsed.holdings, vec![Holding {
            title: Some("No end".to_string()),
            cusip: Some("9".to_string()),
            balance: None,
            value: Some("3".to_string()),
        }]);
    }

    #[test]
    fn lenient_unescape_resolves_what_it_can() {
        assert_eq!(unescape_lenient("AT&T &amp; Co"), "AT&T & Co");
        assert_eq!(unescape_lenient("&#65;&#x42;&bogus;"), "AB&bogus;");
        assert_eq!(escape_stray_angles("a < b <c>").0, "a &lt; b <c>");
        assert_eq!(escape_stray_angles("<![CDATA[x < y]]>").1, 0);
    }

    #[test]
    fn garbage_yields_nothing_without_panicking() {
        let parsed = parse_holdings(b"not xml at all <<<");
        assert!(parsed.holdings.is_empty());
        assert!(!parsed.is_clean());
    }

    #[test]
    fn leading_bom_and_whitespace_are_accepted() {
        let xml = "\u{feff}\n  <?xml version=\"1.0\"?><r><invstOrSec><title>X</title></invstOrSec></r>";
        let parsed = parse_holdings(xml.as_bytes());
        assert!(parsed.is_clean(), "{:?}", parsed.diagnostics);
        assert_eq!(parsed.holdings.len(), 1);
    }
}
