//! Minimal RFC 4180 reader for admin uploads: quoted fields, doubled quotes, CRLF, and line
//! breaks inside quotes.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct CsvError {
    pub line: usize,
    pub reason: &'static str,
}

/// One row and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub line: usize,
    pub fields: Vec<String>,
}

impl Record {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|f| f.trim())
    }

    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Splits `text` into records. Blank lines are skipped.
pub fn parse(text: &str) -> Result<Vec<Record>, CsvError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                let record = Record {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                };
                if !record.is_blank() {
                    records.push(record);
                }
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError {
            line: record_line,
            reason: "unterminated quoted field",
        });
    }

    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        let record = Record {
            line: record_line,
            fields,
        };
        if !record.is_blank() {
            records.push(record);
        }
    }

    Ok(records)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_rows() {
        let rows = parse("a,b,c\n1,2,3\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec!["1", "2", "3"]);
        assert_eq!(rows[1].line, 2);
    }

    #[test]
    fn quotes_commas_and_escapes() {
        let rows = parse("name,note\r\n\"Doe, Jane\",\"said \"\"hi\"\"\"\r\n").unwrap();
        assert_eq!(rows[1].fields, vec!["Doe, Jane", "said \"hi\""]);
    }

    #[test]
    fn newline_inside_quotes_keeps_start_line() {
        let rows = parse("h\n\"multi\nline\"\nnext").unwrap();
        assert_eq!(rows[1].fields, vec!["multi\nline"]);
        assert_eq!(rows[1].line, 2);
        assert_eq!(rows[2].line, 4);
    }

    #[test]
    fn blank_lines_and_missing_trailing_newline() {
        let rows = parse("a\n\n  \nb").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].fields, vec!["b"]);
        assert_eq!(rows[1].line, 4);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(
            parse("a\n\"open,b\n").unwrap_err(),
            CsvError {
                line: 2,
                reason: "unterminated quoted field"
            }
        );
    }

    #[test]
    fn get_trims() {
        let rows = parse(" x , y ").unwrap();
        assert_eq!(rows[0].get(0), Some("x"));
        assert_eq!(rows[0].get(1), Some("y"));
        assert_eq!(rows[0].get(2), None);
    }
}
