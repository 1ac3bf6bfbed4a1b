use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Formats nbconvert can produce for us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Pdf,
    Python,
}

impl ExportFormat {
    /// The name passed to `nbconvert --to`.
    pub fn nbconvert_target(&self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Python => "python",
        }
    }

    /// File extension of the exported file, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Html => ".html",
            ExportFormat::Pdf => ".pdf",
            ExportFormat::Python => ".py",
        }
    }

    /// Whether the server hands the result back base64 encoded.
    pub fn is_binary(&self) -> bool {
        matches!(self, ExportFormat::Pdf)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nbconvert_target())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(ExportFormat::Html),
            "pdf" => Ok(ExportFormat::Pdf),
            "python" | "py" => Ok(ExportFormat::Python),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(ExportFormat::Html.extension(), ".html");
        assert_eq!(ExportFormat::Pdf.extension(), ".pdf");
        assert_eq!(ExportFormat::Python.extension(), ".py");
    }

    #[test]
    fn nbconvert_targets() {
        assert_eq!(ExportFormat::Python.to_string(), "python");
        assert_eq!(ExportFormat::Pdf.nbconvert_target(), "pdf");
    }

    #[test]
    fn only_pdf_is_binary() {
        assert!(ExportFormat::Pdf.is_binary());
        assert!(!ExportFormat::Html.is_binary());
        assert!(!ExportFormat::Python.is_binary());
    }

    #[test]
    fn parses_names() {
        assert_eq!("HTML".parse::<ExportFormat>(), Ok(ExportFormat::Html));
        assert_eq!("py".parse::<ExportFormat>(), Ok(ExportFormat::Python));
        assert!("docx".parse::<ExportFormat>().is_err());
    }
}
