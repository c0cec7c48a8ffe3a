use crate::config::ReaderConfig;
use crate::VoiceDescriptor;

/// How well a selected voice fits the target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceMatch {
    /// The configured preferred voice.
    Preferred,
    /// Some voice in the target language family.
    TargetLanguage,
    /// Anything else the host offered.
    Fallback,
}

/// Picks a synthesis voice from the host's list using a fixed preference order.
///
/// Matching is case-insensitive. The selector is a pure function over the list
/// it is given; callers re-run [`resolve`](Self::resolve) whenever the host's
/// voice list changes, since voices may load lazily after startup.
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    preferred: String,
    vendor: String,
    family: Vec<String>,
}

impl VoiceSelector {
    pub fn new(
        preferred: impl Into<String>,
        vendor: impl Into<String>,
        family: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            preferred: preferred.into().to_lowercase(),
            vendor: vendor.into().to_lowercase(),
            family: family
                .into_iter()
                .map(|t| t.into().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::new(
            &config.preferred_voice,
            &config.vendor_marker,
            &config.language_family,
        )
    }

    /// Resolve the best voice, or `None` if `candidates` is empty.
    ///
    /// Preference order:
    /// 1. the preferred voice token
    /// 2. vendor marker in the name and a target-family language tag
    /// 3. a target-family language tag
    /// 4. vendor marker in the name
    /// 5. the host's default voice
    /// 6. the first candidate
    pub fn resolve<'a>(&self, candidates: &'a [VoiceDescriptor]) -> Option<&'a VoiceDescriptor> {
        let rules: [&dyn Fn(&VoiceDescriptor) -> bool; 5] = [
            &|v: &VoiceDescriptor| self.is_preferred(v),
            &|v: &VoiceDescriptor| self.has_vendor(v) && self.in_family(&v.language_tag),
            &|v: &VoiceDescriptor| self.in_family(&v.language_tag),
            &|v: &VoiceDescriptor| self.has_vendor(v),
            &|v: &VoiceDescriptor| v.is_default,
        ];

        rules
            .iter()
            .find_map(|rule| candidates.iter().find(|v| rule(v)))
            .or_else(|| candidates.first())
    }

    /// Classify a selected voice for status reporting.
    pub fn describe(&self, voice: &VoiceDescriptor) -> VoiceMatch {
        if self.is_preferred(voice) {
            VoiceMatch::Preferred
        } else if self.in_family(&voice.language_tag) {
            VoiceMatch::TargetLanguage
        } else {
            VoiceMatch::Fallback
        }
    }

    /// Whether a language tag belongs to the target family.
    ///
    /// Short tokens like `mn` must match the primary subtag; longer tokens
    /// like `mongolian` may appear anywhere in the tag.
    pub fn in_family(&self, language_tag: &str) -> bool {
        let tag = language_tag.to_lowercase();
        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        self.family.iter().any(|token| {
            primary == token.as_str() || (token.len() > 3 && tag.contains(token.as_str()))
        })
    }

    fn is_preferred(&self, voice: &VoiceDescriptor) -> bool {
        if self.preferred.is_empty() {
            return false;
        }
        let name = voice.name.to_lowercase();
        name == self.preferred
            || name
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == self.preferred)
    }

    fn has_vendor(&self, voice: &VoiceDescriptor) -> bool {
        !self.vendor.is_empty() && voice.name.to_lowercase().contains(self.vendor.as_str())
    }
}

impl Default for VoiceSelector {
    fn default() -> Self {
        Self::from_config(&ReaderConfig::default())
    }
}
