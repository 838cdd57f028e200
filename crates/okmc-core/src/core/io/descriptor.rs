use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// One defect in text form: `KIND SIZE X Y Z [OX OY OZ]`.
///
/// The optional trailing triple is an orientation vector (for example a Burgers vector in units
/// of the lattice constant); only its direction is used.
#[derive(Debug, Clone, PartialEq)]
pub struct DefectDescriptor {
    pub kind: String,
    pub size: u32,
    pub position: [f64; 3],
    pub orientation: Option<[f64; 3]>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DescriptorParseErrorKind {
    #[error("expected 5 or 8 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid size '{0}'")]
    InvalidSize(String),
    #[error("invalid coordinate '{0}'")]
    InvalidFloat(String),
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: DescriptorParseErrorKind,
    },
}

fn parse_triple(fields: &[&str]) -> Result<[f64; 3], DescriptorParseErrorKind> {
    let mut out = [0.0; 3];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field
            .parse()
            .map_err(|_| DescriptorParseErrorKind::InvalidFloat(field.to_string()))?;
    }
    Ok(out)
}

impl FromStr for DefectDescriptor {
    type Err = DescriptorParseErrorKind;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 && fields.len() != 8 {
            return Err(DescriptorParseErrorKind::FieldCount(fields.len()));
        }

        let size = fields[1]
            .parse()
            .map_err(|_| DescriptorParseErrorKind::InvalidSize(fields[1].to_string()))?;
        let position = parse_triple(&fields[2..5])?;
        let orientation = if fields.len() == 8 {
            Some(parse_triple(&fields[5..8])?)
        } else {
            None
        };

        Ok(Self {
            kind: fields[0].to_string(),
            size,
            position,
            orientation,
        })
    }
}

impl fmt::Display for DefectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.position;
        write!(f, "{} {} {:.6} {:.6} {:.6}", self.kind, self.size, x, y, z)?;
        if let Some([ox, oy, oz]) = self.orientation {
            write!(f, " {:.6} {:.6} {:.6}", ox, oy, oz)?;
        }
        Ok(())
    }
}

/// Reads descriptors line by line, skipping blank lines and `#` comments.
pub fn read_descriptors(reader: impl BufRead) -> Result<Vec<DefectDescriptor>, DescriptorError> {
    let mut descriptors = Vec::new();
    for (line_num, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let descriptor = trimmed.parse::<DefectDescriptor>().map_err(|kind| DescriptorError::Parse {
            line: line_num + 1,
            kind,
        })?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

pub fn read_descriptors_from_path<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<DefectDescriptor>, DescriptorError> {
    let file = File::open(path)?;
    read_descriptors(BufReader::new(file))
}

pub fn write_descriptors<'a>(
    writer: &mut impl Write,
    descriptors: impl IntoIterator<Item = &'a DefectDescriptor>,
) -> io::Result<()> {
    for descriptor in descriptors {
        writeln!(writer, "{}", descriptor)?;
    }
    Ok(())
}

pub fn write_descriptors_to_path<'a, P: AsRef<Path>>(
    path: P,
    descriptors: impl IntoIterator<Item = &'a DefectDescriptor>,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_descriptors(&mut writer, descriptors)?;
    writer.flush()
}
