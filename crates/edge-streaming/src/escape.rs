//! Output escaping.

/// Escaping applied to interpolated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoEscape {
    /// Escape HTML special characters.
    #[default]
    Html,
    /// Write values verbatim.
    Disabled,
}

impl AutoEscape {
    /// Pick escaping from a template name: `.html`, `.htm` and `.xml`
    /// templates escape, everything else is verbatim.
    pub fn for_template_name(name: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("html" | "htm" | "xml") => Self::Html,
            _ => Self::Disabled,
        }
    }

    /// Append `value` to `out` with this escaping applied.
    pub fn push(&self, out: &mut String, value: &str) {
        match self {
            Self::Html => out.push_str(&html_escape(value)),
            Self::Disabled => out.push_str(value),
        }
    }
}

/// Simple HTML escape for interpolated values.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
