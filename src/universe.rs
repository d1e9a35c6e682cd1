use crate::error::ScanError;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Symbols from an index constituent CSV: the column headed `Symbol`,
/// in file order, blanks and repeats dropped.
pub fn parse_stock_list(contents: &str) -> Result<Vec<String>, ScanError> {
    read_symbols(reader_builder().from_reader(contents.as_bytes()))
}

pub fn load_stock_list(path: impl AsRef<Path>) -> Result<Vec<String>, ScanError> {
    let path = path.as_ref();
    let reader = reader_builder()
        .from_path(path)
        .map_err(|e| ScanError::Io(format!("{}: {}", path.display(), e)))?;
    read_symbols(reader)
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.flexible(true).trim(csv::Trim::All);
    builder
}

fn read_symbols<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<String>, ScanError> {
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case("symbol"))
        .ok_or_else(|| ScanError::Parse("stock list has no Symbol column".to_string()))?;

    let mut seen = HashSet::new();
    let mut symbols = Vec::new();

    for record in reader.records() {
        let record = record?;
        let Some(symbol) = record.get(column).filter(|s| !s.is_empty()) else {
            continue;
        };
        if seen.insert(symbol.to_string()) {
            symbols.push(symbol.to_string());
        }
    }

    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nse_constituent_file() {
        let csv = "Company Name,Industry,Symbol,Series,ISIN Code\n\
                   \"Aarti Industries Ltd.\",Chemicals,AARTIIND,EQ,INE769A01020\n\
                   \"Angel One Ltd.\",\"Capital Markets, Brokers\",ANGELONE,EQ,INE732I01013\n\
                   \n\
                   Duplicate Row,Chemicals,AARTIIND,EQ,INE769A01020\n";

        let symbols = parse_stock_list(csv).unwrap();
        assert_eq!(symbols, vec!["AARTIIND", "ANGELONE"]);
    }

    #[test]
    fn test_bom_header_and_multiline_quoted_field() {
        let symbols = parse_stock_list("\u{feff}Symbol,Company Name\nTCS,Tata\n").unwrap();
        assert_eq!(symbols, vec!["TCS"]);

        let symbols = parse_stock_list("Company Name,Symbol\n\"Foo\nBar Ltd\",FOO\nBaz,BAZ\n").unwrap();
        assert_eq!(symbols, vec!["FOO", "BAZ"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(&path, "Symbol\nITC\nITC\nRBLBANK\n").unwrap();
        assert_eq!(load_stock_list(&path).unwrap(), vec!["ITC", "RBLBANK"]);
        assert!(matches!(load_stock_list(dir.path().join("nope.csv")), Err(ScanError::Io(_))));
    }

    #[test]
    fn test_missing_symbol_column() {
        assert!(parse_stock_list("Name,Isin\nFoo,Bar\n").is_err());
        assert!(parse_stock_list("").is_err());
    }
}
