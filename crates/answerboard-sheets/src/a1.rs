use std::fmt;

/// A rectangular range on one sheet. Rows are 1-based, columns 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub rows: Option<(u32, u32)>,
    pub columns: Option<(usize, usize)>,
}

impl A1Range {
    /// The whole sheet.
    pub fn sheet(name: impl Into<String>) -> Self {
        Self {
            sheet: name.into(),
            rows: None,
            columns: None,
        }
    }

    /// One full row.
    pub fn row(name: impl Into<String>, row: u32) -> Self {
        Self {
            sheet: name.into(),
            rows: Some((row, row)),
            columns: None,
        }
    }

    /// Cells `first_col..=last_col` of one row.
    pub fn cells(name: impl Into<String>, row: u32, first_col: usize, last_col: usize) -> Self {
        Self {
            sheet: name.into(),
            rows: Some((row, row)),
            columns: Some((first_col.min(last_col), first_col.max(last_col))),
        }
    }

    /// A single cell.
    pub fn cell(name: impl Into<String>, row: u32, col: usize) -> Self {
        Self::cells(name, row, col, col)
    }

    pub fn to_a1(&self) -> String {
        let sheet = quote_sheet_name(&self.sheet);
        match (self.rows, self.columns) {
            (None, None) => sheet,
            (Some((r1, r2)), None) => format!("{sheet}!{r1}:{r2}"),
            (None, Some((c1, c2))) => {
                format!("{sheet}!{}:{}", column_letter(c1), column_letter(c2))
            }
            (Some((r1, r2)), Some((c1, c2))) => format!(
                "{sheet}!{}{r1}:{}{r2}",
                column_letter(c1),
                column_letter(c2)
            ),
        }
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Sheet names are always quoted; embedded quotes are doubled.
pub fn quote_sheet_name(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
