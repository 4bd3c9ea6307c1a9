use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Cell style as an immutable value.
///
/// Font, border, fill, alignment and protection live in the template's cell format record
/// (`base_xf`) and are carried over verbatim. Only the number format can be overridden; doing
/// so produces a *new* style value rather than touching a shared one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Style {
    /// Index of the cell format record this style derives from.
    #[serde(default)]
    pub base_xf: u32,
    /// Number format code replacing the base record's format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
}

impl Style {
    pub fn from_xf(base_xf: u32) -> Self {
        Self {
            base_xf,
            number_format: None,
        }
    }

    /// Copy of this style with the number format replaced.
    pub fn with_number_format(&self, code: impl Into<String>) -> Self {
        Self {
            base_xf: self.base_xf,
            number_format: Some(code.into()),
        }
    }
}

/// Deduplicated table of styles.
///
/// Cells store a `style_id` referencing this table. Style `0` is always the default style.
/// Entries are never mutated once interned, so two cells sharing an id can never observe each
/// other's edits.
#[derive(Clone, Debug, Serialize)]
pub struct StyleTable {
    styles: Vec<Style>,
    #[serde(skip)]
    index: HashMap<Style, u32>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleTable {
    pub fn new() -> Self {
        Self::from_styles(Vec::new())
    }

    fn from_styles(mut styles: Vec<Style>) -> Self {
        if styles.is_empty() {
            styles.push(Style::default());
        }
        let mut index = HashMap::with_capacity(styles.len());
        for (i, style) in styles.iter().enumerate() {
            index.entry(style.clone()).or_insert(i as u32);
        }
        Self { styles, index }
    }

    /// Insert (or reuse) a style, returning its id.
    pub fn intern(&mut self, style: Style) -> u32 {
        if let Some(id) = self.index.get(&style) {
            return *id;
        }
        let id = self.styles.len() as u32;
        self.styles.push(style.clone());
        self.index.insert(style, id);
        id
    }

    pub fn get(&self, style_id: u32) -> Option<&Style> {
        self.styles.get(style_id as usize)
    }

    /// Intern the style of `style_id` with its number format replaced by `code`.
    ///
    /// Unknown ids are treated as the default style.
    pub fn with_number_format(&mut self, style_id: u32, code: &str) -> u32 {
        let base = self.get(style_id).cloned().unwrap_or_default();
        if base.number_format.as_deref() == Some(code) {
            return style_id;
        }
        self.intern(base.with_number_format(code))
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Style)> {
        self.styles.iter().enumerate().map(|(i, s)| (i as u32, s))
    }
}

impl<'de> Deserialize<'de> for StyleTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Helper {
            #[serde(default)]
            styles: Vec<Style>,
        }

        let helper = Helper::deserialize(deserializer)?;
        Ok(StyleTable::from_styles(helper.styles))
    }
}
