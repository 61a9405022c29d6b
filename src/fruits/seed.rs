//! CSV import for the fruit table.
//!
//! Expected layout, header row first:
//!
//! ```text
//! name,description,price,quantity
//! Apple,Crisp and sweet,1.25,40
//! Kiwi,"Fuzzy, green",1.00,5
//! ```
//!
//! Fields may be double-quoted to carry commas, with `""` for a literal quote.
//! A quoted field cannot span lines.

use std::io::BufRead;

use super::NewFruit;
use crate::error::{Error, Result};

const EXPECTED_HEADER: [&str; 4] = ["name", "description", "price", "quantity"];

/// Parse every data row; fails on the first malformed line
pub fn parse_csv<R: BufRead>(reader: R) -> Result<Vec<NewFruit>> {
    let mut fruits = Vec::new();
    let mut header_seen = false;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let owned = split_record(&line, line_no)?;
        let fields: Vec<&str> = owned.iter().map(|f| f.trim()).collect();

        if !header_seen {
            let header: Vec<String> = fields.iter().map(|f| f.to_ascii_lowercase()).collect();
            if header != EXPECTED_HEADER {
                return Err(Error::Validation(format!(
                    "line {}: expected header '{}'",
                    line_no,
                    EXPECTED_HEADER.join(",")
                )));
            }
            header_seen = true;
            continue;
        }

        fruits.push(parse_row(&fields, line_no)?);
    }

    Ok(fruits)
}

fn split_record(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(Error::Validation(format!(
            "line {}: unterminated quoted field",
            line_no
        )));
    }
    fields.push(field);
    Ok(fields)
}

fn parse_row(fields: &[&str], line_no: usize) -> Result<NewFruit> {
    let [name, description, price, quantity] = fields else {
        return Err(Error::Validation(format!(
            "line {}: expected 4 fields, found {}",
            line_no,
            fields.len()
        )));
    };

    let price: f64 = price
        .parse()
        .map_err(|_| Error::Validation(format!("line {}: invalid price '{}'", line_no, price)))?;
    let quantity: i32 = quantity.parse().map_err(|_| {
        Error::Validation(format!("line {}: invalid quantity '{}'", line_no, quantity))
    })?;

    NewFruit {
        name: name.to_string(),
        description: Some(description.to_string()),
        price,
        quantity,
    }
    .validated()
    .map_err(|e| Error::Validation(format!("line {}: {}", line_no, e)))
}
