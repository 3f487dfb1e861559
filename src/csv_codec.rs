use std::io::Write;

use serde::Serialize;

fn writer_builder() -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'));
    builder
}

/// Encodes one row, newline included. Fields holding a comma, a quote or a
/// line break are quoted with embedded quotes doubled.
pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> Result<String, csv::Error> {
    let mut wtr = writer_builder().from_writer(Vec::new());
    wtr.write_record(fields.iter().map(|f| f.as_ref()))?;
    let bytes = wtr
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err).into())
}

/// Splits one encoded row back into fields. A single trailing line terminator
/// is ignored; line breaks inside quotes are kept.
pub fn decode_row(line: &str) -> Vec<String> {
    let line = line
        .strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line);

    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    fields.push(current);
    fields
}

/// Header-first CSV output used by every export and by the import ledger.
pub struct CsvSink<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W, header: &[&str]) -> Result<Self, csv::Error> {
        let mut inner = writer_builder().from_writer(out);
        inner.write_record(header)?;
        Ok(Self { inner })
    }

    pub fn row<T: Serialize>(&mut self, record: &T) -> Result<(), csv::Error> {
        self.inner.serialize(record)
    }

    pub fn finish(mut self) -> Result<(), csv::Error> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_are_joined_with_commas() {
        assert_eq!(encode_row(&["a", "b", "c"]).unwrap(), "a,b,c\n");
    }

    #[test]
    fn special_fields_are_quoted() {
        let encoded = encode_row(&["x,y", "say \"hi\"", "two\nlines", "plain"]).unwrap();
        assert_eq!(encoded, "\"x,y\",\"say \"\"hi\"\"\",\"two\nlines\",plain\n");
    }

    #[test]
    fn decodes_quoted_and_escaped_fields() {
        let fields = decode_row(r#"S1,"Doe, Jane","He said ""no""",,last"#);
        assert_eq!(fields, vec!["S1", "Doe, Jane", "He said \"no\"", "", "last"]);
    }

    #[test]
    fn trailing_comma_yields_empty_field() {
        assert_eq!(decode_row("a,b,"), vec!["a", "b", ""]);
    }

    #[test]
    fn round_trips_awkward_values() {
        let samples: Vec<Vec<&str>> = vec![
            vec!["S0001", "Jane Doe", "3.8"],
            vec!["", "", ""],
            vec![""],
            vec!["comma, inside", "\"quoted\"", "\"\"", "line\nbreak", "cr\r\nlf"],
            vec!["trailing space ", " leading", "émoji ✓"],
        ];

        for fields in samples {
            let encoded = encode_row(fields.as_slice()).unwrap();
            assert!(encoded.ends_with('\n'));
            assert_eq!(decode_row(&encoded), fields, "{encoded:?}");
        }
    }

    #[test]
    fn sink_writes_header_even_without_rows() {
        let mut out = Vec::new();
        CsvSink::new(&mut out, &["a", "b"]).unwrap().finish().unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n");
    }

    #[test]
    fn sink_serializes_rows_in_field_order() {
        #[derive(Serialize)]
        struct Row<'a> {
            name: &'a str,
            gpa: f64,
        }

        let mut out = Vec::new();
        let mut sink = CsvSink::new(&mut out, &["name", "gpa"]).unwrap();
        sink.row(&Row { name: "Doe, Jane", gpa: 4.0 }).unwrap();
        sink.row(&Row { name: "Sam", gpa: 2.5 }).unwrap();
        sink.finish().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name,gpa\n\"Doe, Jane\",4.0\nSam,2.5\n"
        );
    }
}
