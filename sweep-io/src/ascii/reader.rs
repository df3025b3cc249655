use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use itertools::{EitherOrBoth::*, Itertools};
use sweep_core::{
    containers::{CloudHeader, Point, PointCloud},
    nalgebra::Vector3,
};

use super::PointField;

/// Reads point clouds from delimited text files with one point per line.
///
/// Blank lines and lines starting with `#` are ignored. Columns beyond the ones named in the format are
/// ignored as well.
pub struct AsciiReader<T: BufRead> {
    reader: T,
    delimiter: String,
    fields: Vec<PointField>,
    header: CloudHeader,
}

impl AsciiReader<BufReader<File>> {
    /// Opens the file at `path`. The frame id of the resulting cloud is the file stem, see
    /// [AsciiReader::from_read] for `format` and `delimiter`.
    ///
    /// # Examples
    /// ```no_run
    /// use anyhow::Result;
    /// use sweep_io::ascii::AsciiReader;
    /// fn main() -> Result<()> {
    ///     let cloud = AsciiReader::from_path("scan_0001.txt", "xyzir", " ")?.read()?;
    ///     println!("{} points", cloud.len());
    ///     Ok(())
    /// }
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P, format: &str, delimiter: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Could not open point file {}", path.display()))?;
        let frame_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::from_read(BufReader::new(file), format, delimiter)?
            .with_header(CloudHeader::new(frame_id, None)))
    }
}

impl<T: BufRead> AsciiReader<T> {
    /// Creates a reader for the given `read`. Each character of `format` describes one column:
    /// - s → skip this column
    /// - x → x coordinate
    /// - y → y coordinate
    /// - z → z coordinate
    /// - i → intensity
    /// - r → ring (laser id)
    ///
    /// `x`, `y` and `z` are required. A `delimiter` that consists only of whitespace splits on any run of
    /// whitespace.
    ///
    /// # Errors
    ///
    /// If `format` contains unrecognized or repeated literals, or misses a coordinate, an error is returned.
    pub fn from_read(read: T, format: &str, delimiter: &str) -> Result<Self> {
        Ok(Self {
            reader: read,
            delimiter: delimiter.to_string(),
            fields: PointField::parse_format(format)?,
            header: CloudHeader::default(),
        })
    }

    /// Header attached to the cloud returned by [AsciiReader::read]
    pub fn with_header(mut self, header: CloudHeader) -> Self {
        self.header = header;
        self
    }

    /// Reads all remaining points
    pub fn read(&mut self) -> Result<PointCloud> {
        let mut points = vec![];
        for (index, line) in (&mut self.reader).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let point = Self::parse_point(&self.delimiter, &self.fields, trimmed)
                .with_context(|| format!("ReadError in line {}.", index + 1))?;
            points.push(point);
        }
        log::debug!(
            "Read {} points for frame '{}'",
            points.len(),
            self.header.frame_id
        );
        Ok(PointCloud::new(self.header.clone(), points))
    }

    fn parse_point(delimiter: &str, fields: &[PointField], line: &str) -> Result<Point> {
        let values: Vec<&str> = if delimiter.trim().is_empty() {
            line.split_whitespace().collect()
        } else {
            line.split(delimiter).map(str::trim).collect()
        };

        let mut position = Vector3::zeros();
        let mut intensity = None;
        let mut ring = None;
        for pair in values.into_iter().zip_longest(fields) {
            match pair {
                Both(value, field) => match field {
                    PointField::Skip => {}
                    PointField::CoordinateX => position.x = parse_value(value, *field)?,
                    PointField::CoordinateY => position.y = parse_value(value, *field)?,
                    PointField::CoordinateZ => position.z = parse_value(value, *field)?,
                    PointField::Intensity => intensity = Some(parse_value(value, *field)?),
                    PointField::Ring => ring = Some(parse_value(value, *field)?),
                },
                Left(_) => break,
                Right(_) => {
                    bail!("Input format string expected more items in the line. Found End-of-Line.")
                }
            }
        }

        let mut point = Point::from_position(position);
        point.intensity = intensity;
        point.ring = ring;
        Ok(point)
    }
}

fn parse_value<V: FromStr>(value: &str, field: PointField) -> Result<V> {
    value.parse::<V>().map_err(|_| {
        anyhow::anyhow!(
            "ParseError at parsing {} for format literal '{}': expected {} found '{}'.",
            field,
            field.literal(),
            std::any::type_name::<V>(),
            value
        )
    })
}
