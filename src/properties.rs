use chrono::NaiveDateTime;
use std::collections::HashMap;

use crate::coerce::{self, Toggle};
use crate::error::{ParseError, ShapeError};
use crate::layout::{PROPERTIES_SHEET, PROPERTY_LABEL_COLUMN, PROPERTY_VALUE_COLUMN, RANGE_SEPARATOR};
use crate::sheet::{Cell, Sheet};

/// Label → value pairs of a two-column property sheet.
/// Labels are trimmed but otherwise kept verbatim; a repeated label keeps the
/// last value.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    sheet: String,
    values: HashMap<String, Cell>,
}

impl Properties {
    pub fn decode(sheet: &Sheet) -> Self {
        Self::decode_named(PROPERTIES_SHEET, sheet)
    }

    pub fn decode_named(name: &str, sheet: &Sheet) -> Self {
        let values = sheet
            .label_index(PROPERTY_LABEL_COLUMN, str::to_string)
            .into_iter()
            .map(|(label, row)| (label, sheet.cell(PROPERTY_VALUE_COLUMN, row).clone()))
            .collect();
        Self {
            sheet: name.to_string(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Cell> {
        self.values.get(label)
    }

    /// Value for a label that must be present
    pub fn require(&self, label: &str) -> Result<&Cell, ShapeError> {
        self.values.get(label).ok_or_else(|| ShapeError::MissingLabel {
            sheet: self.sheet.clone(),
            label: label.to_string(),
        })
    }

    fn field<T>(
        &self,
        label: &str,
        parse: impl FnOnce(&Cell) -> Result<T, ParseError>,
    ) -> Result<T, ShapeError> {
        parse(self.require(label)?).map_err(|source| ShapeError::InvalidField {
            label: label.to_string(),
            source,
        })
    }

    /// Non-empty text value
    pub fn text(&self, label: &str) -> Result<String, ShapeError> {
        self.field(label, |c| c.text().map(|t| t.into_owned()).ok_or(ParseError::Empty))
    }

    pub fn float(&self, label: &str) -> Result<f64, ShapeError> {
        self.field(label, coerce::parse_float)
    }

    pub fn int(&self, label: &str) -> Result<i64, ShapeError> {
        self.field(label, coerce::parse_int)
    }

    pub fn date(&self, label: &str) -> Result<NaiveDateTime, ShapeError> {
        self.field(label, coerce::parse_date_cell)
    }

    /// On/Off switch. A missing label is an error; any value other than "On" is Off.
    pub fn toggle(&self, label: &str) -> Result<Toggle, ShapeError> {
        Ok(Toggle::from_cell(self.require(label)?))
    }

    /// "start — end" range split on the em-dash
    pub fn range(&self, label: &str) -> Result<(NaiveDateTime, NaiveDateTime), ShapeError> {
        let raw = self.text(label)?;
        let parts: Vec<&str> = raw.split(RANGE_SEPARATOR).collect();
        let [start, end] = parts.as_slice() else {
            return Err(ShapeError::BadRange {
                label: label.to_string(),
                value: raw.clone(),
            });
        };

        let parse = |s: &str| {
            coerce::parse_date(s).map_err(|source| ShapeError::InvalidField {
                label: label.to_string(),
                source,
            })
        };
        Ok((parse(*start)?, parse(*end)?))
    }
}
