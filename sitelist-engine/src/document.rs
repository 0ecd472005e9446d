/*!
XML site list document consumed by Edge in IE mode
*/

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, info, warn};

use crate::entry::Entry;
use crate::error::DocumentError;
use crate::list::SiteList;

/// Value written to both `compat-mode` and `open-in` for every site.
pub const COMPAT_MODE: &str = "IE11";

const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// What was found at the document location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    /// No document; equivalent to an empty site list.
    Absent,
    Present(SiteList),
}

impl DocumentState {
    pub fn into_list(self) -> SiteList {
        match self {
            DocumentState::Absent => SiteList::new(),
            DocumentState::Present(list) => list,
        }
    }
}

/// The site list document at a fixed location.
#[derive(Debug, Clone)]
pub struct SiteListDocument {
    path: PathBuf,
}

impl SiteListDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<DocumentState, DocumentError> {
        self.read_with_dropped().map(|(state, _)| state)
    }

    /// Read the document, also returning `url` values that could not be
    /// used. Each one is logged, since saving the list will leave it out.
    pub fn read_with_dropped(&self) -> Result<(DocumentState, Vec<String>), DocumentError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No site list at {}", self.path.display());
                return Ok((DocumentState::Absent, Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };
        let (sites, dropped) = parse_with_dropped(&content)?;
        for url in &dropped {
            warn!(
                "Site {:?} in {} is not an http(s) URL and will be removed when the site list is saved",
                url,
                self.path.display()
            );
        }
        Ok((DocumentState::Present(sites), dropped))
    }

    /// Write the list under a fresh version stamp and return the document location.
    pub fn write(&self, list: &SiteList) -> Result<PathBuf, DocumentError> {
        let xml = render(list, &generate_version())?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, xml)?;
        info!("Wrote {} site(s) to {}", list.len(), self.path.display());
        Ok(self.path.clone())
    }

    /// Remove the document. Returns `false` when there was nothing to remove.
    pub fn delete(&self) -> Result<bool, DocumentError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed site list {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// A version stamp that changes on every save so Edge re-reads the list.
pub fn generate_version() -> String {
    chrono::Local::now().format(VERSION_FORMAT).to_string()
}

/// Render the document with two-space indentation and no blank lines.
pub fn render(list: &SiteList, version: &str) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("site-list").with_attributes([("version", version)]),
    ))?;

    for entry in list {
        writer.write_event(Event::Start(
            BytesStart::new("site").with_attributes([("url", entry.as_str())]),
        ))?;
        for field in ["compat-mode", "open-in"] {
            writer.write_event(Event::Start(BytesStart::new(field)))?;
            writer.write_event(Event::Text(BytesText::new(COMPAT_MODE)))?;
            writer.write_event(Event::End(BytesEnd::new(field)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("site")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("site-list")))?;

    let raw = String::from_utf8_lossy(&writer.into_inner()).into_owned();
    let mut out = raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    Ok(out)
}

/// Read the `url` of every `<site>` directly under the root element.
pub fn parse(xml: &str) -> Result<SiteList, DocumentError> {
    parse_with_dropped(xml).map(|(sites, _)| sites)
}

/// Like [`parse`], also returning the non-empty `url` values that are not
/// usable entries. Those sites are not carried into the next save.
pub fn parse_with_dropped(xml: &str) -> Result<(SiteList, Vec<String>), DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut root_closed = false;
    let mut entries = Vec::new();
    let mut dropped = Vec::new();

    loop {
        let event = reader.read_event()?;
        if let Event::Start(element) | Event::Empty(element) = &event {
            if root_closed {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                return Err(DocumentError::TrailingElement(name));
            }
            if depth == 1 && element.name().as_ref() == b"site" {
                collect_site(element, &mut entries, &mut dropped)?;
            }
        }
        match event {
            Event::Start(_) => depth += 1,
            Event::Empty(_) if depth == 0 => root_closed = true,
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                root_closed = depth == 0;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(DocumentError::Unclosed(depth));
    }
    if !root_closed {
        return Err(DocumentError::MissingRoot);
    }
    Ok((SiteList::from_entries(entries), dropped))
}

fn collect_site(
    element: &BytesStart<'_>,
    entries: &mut Vec<Entry>,
    dropped: &mut Vec<String>,
) -> Result<(), DocumentError> {
    for attribute in element.attributes() {
        let attribute = attribute?;
        if attribute.key.as_ref() != b"url" {
            continue;
        }
        let url = attribute.unescape_value()?;
        if url.is_empty() {
            return Ok(());
        }
        match Entry::normalize(&url) {
            Ok(entry) => entries.push(entry),
            Err(_) => dropped.push(url.into_owned()),
        }
        return Ok(());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn list(urls: &[&str]) -> SiteList {
        SiteList::from_entries(urls.iter().map(|u| Entry::normalize(u).unwrap()))
    }

    #[test]
    fn renders_the_expected_layout() {
        let xml = render(&list(&["https://a.example", "http://b.example/x?y=1&z=2"]), "20240102030405").unwrap();
        assert_eq!(
            xml,
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
                "<site-list version=\"20240102030405\">\n",
                "  <site url=\"https://a.example\">\n",
                "    <compat-mode>IE11</compat-mode>\n",
                "    <open-in>IE11</open-in>\n",
                "  </site>\n",
                "  <site url=\"http://b.example/x?y=1&amp;z=2\">\n",
                "    <compat-mode>IE11</compat-mode>\n",
                "    <open-in>IE11</open-in>\n",
                "  </site>\n",
                "</site-list>\n",
            )
        );
    }

    #[test]
    fn reads_only_direct_site_children_with_urls() {
        let xml = r#"<?xml version="1.0" ?>
<site-list version="1">
  <site url="https://a.example"><compat-mode>IE11</compat-mode></site>
  <site/>
  <site url=""/>
  <group><site url="https://nested.example"/></group>
  <site url="https://b.example:8443/app"/>
  <site url="https://a.example"/>
</site-list>"#;
        assert_eq!(parse(xml).unwrap(), list(&["https://a.example", "https://b.example/app"]));
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(matches!(parse("not xml at all"), Err(DocumentError::MissingRoot)));
        assert!(parse(r#"<site-list><site url="https://a.example"></site-list>"#).is_err());

        let truncated = "<site-list version=\"1\">\n  <site url=\"https://a.example\">\n    <compat-mode>IE11</compat-mode>\n";
        assert!(matches!(parse(truncated), Err(DocumentError::Unclosed(2))));

        let second_root = r#"<site-list version="1"/><site url="https://x.example"/>"#;
        assert!(matches!(
            parse(second_root),
            Err(DocumentError::TrailingElement(name)) if name == "site"
        ));
        assert!(matches!(
            parse(r#"<site-list></site-list><site-list></site-list>"#),
            Err(DocumentError::TrailingElement(_))
        ));
    }

    #[test]
    fn empty_root_is_an_empty_list() {
        assert_eq!(parse(r#"<?xml version="1.0"?><site-list version="1"/>"#).unwrap(), SiteList::new());
    }

    #[test]
    fn unusable_urls_are_reported_as_dropped() {
        let xml = r#"<site-list version="1">
  <site url="ftp://legacy.example"/>
  <site url="https://a.example"/>
</site-list>"#;
        let (sites, dropped) = parse_with_dropped(xml).unwrap();
        assert_eq!(sites, list(&["https://a.example"]));
        assert_eq!(dropped, vec!["ftp://legacy.example".to_string()]);
    }

    #[test]
    fn missing_document_reads_as_absent_and_delete_is_a_noop() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let document = SiteListDocument::new(dir.path().join("ie-sitelist.xml"));
        assert_eq!(document.read().unwrap(), DocumentState::Absent);
        assert!(!document.delete().unwrap());
    }

    #[test]
    fn write_creates_parent_directory_and_reads_back() {
        let dir = tempfile::tempdir().expect("must create tempdir");
        let document = SiteListDocument::new(dir.path().join("Edge").join("ie-sitelist.xml"));
        let sites = list(&["https://b.example", "https://a.example"]);

        let location = document.write(&sites).unwrap();
        assert_eq!(location, document.path());
        assert_eq!(document.read().unwrap(), DocumentState::Present(sites));

        assert!(document.delete().unwrap());
        assert!(!document.path().exists());
    }

    proptest! {
        #[test]
        fn read_after_write_preserves_order(paths in prop::collection::vec("[a-z0-9]{1,6}(/[a-z&=?]{0,6})?", 0..12)) {
            let sites = SiteList::from_entries(
                paths.iter().map(|p| Entry::normalize(&format!("https://{p}")).unwrap()),
            );
            let xml = render(&sites, "20240101000000").unwrap();
            prop_assert_eq!(parse(&xml).unwrap(), sites);
        }
    }
}
