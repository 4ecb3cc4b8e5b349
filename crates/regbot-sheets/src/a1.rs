//! A1-notation helpers (`'Sheet 1'!B3`, `'Sheet 1'!A:A`).

/// 1-based column index to letters: 1 -> `A`, 27 -> `AA`.
pub fn column_letters(mut col: usize) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Worksheet title quoted for use in a range; embedded `'` is doubled.
pub fn quote_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

pub fn column_range(title: &str, col: usize) -> String {
    let letters = column_letters(col);
    format!("{}!{letters}:{letters}", quote_title(title))
}

pub fn row_range(title: &str, row: usize) -> String {
    format!("{}!{row}:{row}", quote_title(title))
}

pub fn cell(title: &str, row: usize, col: usize) -> String {
    format!("{}!{}{row}", quote_title(title), column_letters(col))
}
