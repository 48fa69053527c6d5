use crate::settings::AppSettings;

use super::snapshot::AppCategory;

const FOCUS_KEYWORDS: &[&str] = &["code", "idea", "studio", "vim", "emacs", "pycharm", "devenv"];
const CASUAL_KEYWORDS: &[&str] = &[
    "chrome", "edge", "firefox", "whatsapp", "telegram", "discord", "youtube", "spotify",
];

/// Maps an application name to a category: exact (case-insensitive) matches from
/// the configured tables first, then substring keywords.
#[derive(Debug, Clone)]
pub struct AppClassifier {
    focus: Vec<String>,
    casual: Vec<String>,
    use_builtin_keywords: bool,
}

impl AppClassifier {
    pub fn new(settings: &AppSettings) -> Self {
        let lower = |names: &[String]| names.iter().map(|n| n.to_lowercase()).collect::<Vec<_>>();
        Self {
            focus: lower(&settings.focus),
            casual: lower(&settings.casual),
            use_builtin_keywords: settings.use_builtin_keywords,
        }
    }

    pub fn classify(&self, app_name: &str) -> AppCategory {
        let name = app_name.to_lowercase();

        if self.focus.iter().any(|f| *f == name) {
            return AppCategory::Focus;
        }
        if self.casual.iter().any(|c| *c == name) {
            return AppCategory::Casual;
        }
        if !self.use_builtin_keywords {
            return AppCategory::Unknown;
        }
        if FOCUS_KEYWORDS.iter().any(|k| name.contains(k)) {
            return AppCategory::Focus;
        }
        if CASUAL_KEYWORDS.iter().any(|k| name.contains(k)) {
            return AppCategory::Casual;
        }
        AppCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(use_builtin_keywords: bool) -> AppClassifier {
        AppClassifier::new(&AppSettings {
            focus: vec!["Obsidian".into()],
            casual: vec!["Code.exe".into()],
            use_builtin_keywords,
        })
    }

    #[test]
    fn configured_names_win_over_keywords() {
        let classifier = classifier(true);
        assert_eq!(classifier.classify("obsidian"), AppCategory::Focus);
        // "code" is a focus keyword, but the table says casual.
        assert_eq!(classifier.classify("code.exe"), AppCategory::Casual);
    }

    #[test]
    fn keywords_and_unmapped_fallback() {
        let classifier = classifier(true);
        assert_eq!(classifier.classify("nvim-qt vim"), AppCategory::Focus);
        assert_eq!(classifier.classify("firefox"), AppCategory::Casual);
        assert_eq!(classifier.classify("calculator"), AppCategory::Unknown);
    }

    #[test]
    fn keywords_can_be_disabled() {
        assert_eq!(classifier(false).classify("firefox"), AppCategory::Unknown);
    }
}
