/// Input sanitizer for chat text and upload file names.
pub struct Sanitizer {
    max_input_length: usize,
    max_file_name_length: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_input_length: 4_096,
            max_file_name_length: 200,
        }
    }
}

impl Sanitizer {
    pub fn new(max_input_length: usize, max_file_name_length: usize) -> Self {
        Self {
            max_input_length,
            max_file_name_length,
        }
    }

    /// Sanitize a line of user text: trim, strip control characters,
    /// enforce the length limit.
    pub fn sanitize(&self, input: &str) -> SanitizeResult {
        if input.len() > self.max_input_length {
            return SanitizeResult::Rejected("Input exceeds maximum length".to_string());
        }

        let trimmed = input.trim();
        let cleaned: String = trimmed.chars().filter(|c| !c.is_control()).collect();

        if cleaned.is_empty() && !trimmed.is_empty() {
            return SanitizeResult::Rejected("Input contains only control characters".to_string());
        }

        if cleaned != input {
            SanitizeResult::Cleaned(cleaned)
        } else {
            SanitizeResult::Clean(cleaned)
        }
    }

    /// Reduce an upload's display name to a safe base name.
    ///
    /// Directory components, control characters and characters reserved on
    /// common filesystems are removed; over-long names are shortened while
    /// keeping a short extension. Falls back to `file`.
    pub fn sanitize_file_name(&self, display_name: &str) -> String {
        let base = display_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let cleaned: String = base
            .chars()
            .filter(|c| !c.is_control())
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
                c => c,
            })
            .collect();
        let cleaned = cleaned.trim().trim_start_matches('.');
        if cleaned.is_empty() {
            return "file".to_string();
        }
        self.shorten(cleaned)
    }

    fn shorten(&self, name: &str) -> String {
        let max = self.max_file_name_length;
        if name.chars().count() <= max {
            return name.to_string();
        }
        let (stem, ext) = match name.rfind('.') {
            Some(dot) if name.len() - dot <= 10 => name.split_at(dot),
            _ => (name, ""),
        };
        let keep = max.saturating_sub(ext.chars().count()).max(1);
        let mut short: String = stem.chars().take(keep).collect();
        short.push_str(ext);
        short
    }
}

#[derive(Debug, PartialEq)]
pub enum SanitizeResult {
    /// Input was already clean.
    Clean(String),
    /// Input was cleaned (whitespace trimmed or control characters removed).
    Cleaned(String),
    /// Input was rejected entirely.
    Rejected(String),
}

impl SanitizeResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, SanitizeResult::Rejected(_))
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            SanitizeResult::Clean(s) | SanitizeResult::Cleaned(s) => Some(s),
            SanitizeResult::Rejected(_) => None,
        }
    }
}
