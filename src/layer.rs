use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The five supported input layer kinds, in cube band order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Vector,
    Raster,
    Line,
    Attribute,
    Target,
}

impl LayerKind {
    /// Fixed concatenation order of per-kind outputs.
    pub const BAND_ORDER: [LayerKind; 5] = [
        LayerKind::Vector,
        LayerKind::Raster,
        LayerKind::Line,
        LayerKind::Attribute,
        LayerKind::Target,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Vector => "vector",
            LayerKind::Raster => "raster",
            LayerKind::Line => "line",
            LayerKind::Attribute => "attribute",
            LayerKind::Target => "target",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category -> integer code mapping; codes follow first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Legend {
    categories: Vec<String>,
    #[serde(skip)]
    codes: HashMap<String, u32>,
}

impl Legend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut legend = Self::new();
        for category in categories {
            legend.insert(category);
        }
        legend
    }

    /// Code for `category`, assigning the next one if unseen.
    pub fn insert(&mut self, category: impl Into<String>) -> u32 {
        let category = category.into();
        if let Some(&code) = self.codes.get(&category) {
            return code;
        }
        let code = self.categories.len() as u32;
        self.codes.insert(category.clone(), code);
        self.categories.push(category);
        code
    }

    pub fn code(&self, category: &str) -> Option<u32> {
        self.codes
            .get(category)
            .copied()
            .or_else(|| self.categories.iter().position(|c| c == category).map(|i| i as u32))
    }

    pub fn category(&self, code: u32) -> Option<&str> {
        self.categories.get(code as usize).map(String::as_str)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Rebuild the lookup table after deserialization.
    pub(crate) fn reindex(&mut self) {
        self.codes = self
            .categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i as u32))
            .collect();
    }
}

/// One named 2-D band, optionally categorical.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub data: Array2<f32>,
    pub legend: Option<Legend>,
}

impl Layer {
    pub fn new(name: impl Into<String>, data: Array2<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            legend: None,
        }
    }

    pub fn categorical(name: impl Into<String>, data: Array2<f32>, legend: Legend) -> Self {
        Self {
            name: name.into(),
            data,
            legend: Some(legend),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legend_first_seen_order() {
        let mut legend = Legend::new();
        assert_eq!(legend.insert("forest"), 0);
        assert_eq!(legend.insert("water"), 1);
        assert_eq!(legend.insert("forest"), 0);
        assert_eq!(legend.insert("urban"), 2);
        assert_eq!(legend.categories(), &["forest", "water", "urban"]);
        assert_eq!(legend.code("water"), Some(1));
        assert_eq!(legend.category(2), Some("urban"));
        assert_eq!(legend.code("desert"), None);
    }

    #[test]
    fn test_legend_serde_reindex() {
        let legend = Legend::from_categories(["b", "a"]);
        let json = serde_json::to_string(&legend).unwrap();
        let mut decoded: Legend = serde_json::from_str(&json).unwrap();
        decoded.reindex();
        assert_eq!(decoded, legend);
        assert_eq!(decoded.code("a"), Some(1));
    }

    #[test]
    fn test_band_order() {
        let names: Vec<&str> = LayerKind::BAND_ORDER.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["vector", "raster", "line", "attribute", "target"]);
    }
}
