//! Class-name table

use std::path::Path;

use crate::utils::error::Result;

/// Ordered class names indexed by model output position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Parse one name per line, skipping blank lines
    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    /// Load from a UTF-8 text file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Load from a file, or fall back to generic names if it cannot be read
    pub fn load_or_generic(path: &Path) -> Self {
        match Self::load(path) {
            Ok(labels) => {
                tracing::debug!("Loaded {} class names from {:?}", labels.len(), path);
                labels
            }
            Err(e) => {
                tracing::warn!("Class names unavailable ({}), using generic names", e);
                Self::default()
            }
        }
    }

    /// Name for an index; unknown indices render as `Class <i>`
    pub fn name(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("Class {}", index))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_lines() {
        let labels = ClassLabels::parse("AM General Hummer SUV 2000\n\n  Acura RL Sedan 2012 \n");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.name(1), "Acura RL Sedan 2012");
    }

    #[test]
    fn test_out_of_range_is_generic() {
        let labels = ClassLabels::parse("Audi R8 Coupe 2012");
        assert_eq!(labels.name(7), "Class 7");
    }

    #[test]
    fn test_missing_file_falls_back() {
        let labels = ClassLabels::load_or_generic(Path::new("/nonexistent/labels.txt"));
        assert!(labels.is_empty());
        assert_eq!(labels.name(0), "Class 0");
    }
}
