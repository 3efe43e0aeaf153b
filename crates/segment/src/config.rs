use crate::error::{ErrorKind, Result};

/// Tuning knobs for [`segment`](crate::segment).
///
/// None of these have a universally right value: they depend on the art
/// style, the gutter colour and the resolution a source serves, so every one
/// of them is configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConfig {
    /// Smallest page the planner will cut on a blank band (px). Only the last
    /// page of a strip may end up shorter.
    pub min_page_height: u32,
    /// Hard upper bound on page height (px); forced cuts happen here.
    pub max_page_height: u32,
    /// A row is blank when its luminance standard deviation is below this.
    pub blank_threshold: f64,
    /// A run of blank rows must be at least this long to count as a band.
    pub min_blank_rows: u32,
}
impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_page_height: 950,
            max_page_height: 1600,
            blank_threshold: 4.0,
            min_blank_rows: 5,
        }
    }
}
impl SegmentConfig {
    /// The page height the planner aims for when choosing between bands.
    pub fn ideal_page_height(&self) -> u32 {
        self.min_page_height + (self.max_page_height - self.min_page_height) / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_page_height == 0 {
            exn::bail!(ErrorKind::InvalidConfig("minimum page height must be positive".to_string()));
        }
        if self.min_page_height > self.max_page_height {
            exn::bail!(ErrorKind::InvalidConfig(format!(
                "minimum page height {} exceeds maximum {}",
                self.min_page_height, self.max_page_height
            )));
        }
        if !self.blank_threshold.is_finite() || self.blank_threshold < 0.0 {
            exn::bail!(ErrorKind::InvalidConfig(format!("blank threshold {} is not usable", self.blank_threshold)));
        }
        if self.min_blank_rows == 0 {
            exn::bail!(ErrorKind::InvalidConfig("blank bands need at least one row".to_string()));
        }
        Ok(())
    }
}
