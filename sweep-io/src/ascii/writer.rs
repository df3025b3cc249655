use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use sweep_core::containers::PointCloud;

use super::PointField;

/// Writes point clouds as delimited text, one point per line.
///
/// Every line holds `x y z`, followed by the intensity and the ring if all points of the cloud carry them, and
/// by `nx ny nz curvature` if all points carry surface attributes. The first line is a `#` comment with the
/// frame id and the format string that reads the file back with [AsciiReader](super::AsciiReader).
pub struct AsciiWriter<W: Write> {
    writer: W,
    delimiter: String,
}

impl AsciiWriter<BufWriter<File>> {
    /// Creates the file at `path`, overwriting it if it exists
    ///
    /// # Examples
    /// ```no_run
    /// use anyhow::Result;
    /// use sweep_core::containers::PointCloud;
    /// use sweep_io::ascii::AsciiWriter;
    /// fn main() -> Result<()> {
    ///     let cloud = PointCloud::default();
    ///     AsciiWriter::from_path("aligned.txt")?.write(&cloud)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Could not create point file {}", path.display()))?;
        Ok(Self::from_write(BufWriter::new(file), " "))
    }
}

impl<W: Write> AsciiWriter<W> {
    pub fn from_write(write: W, delimiter: &str) -> Self {
        Self {
            writer: write,
            delimiter: delimiter.to_string(),
        }
    }

    /// Writes all points of `cloud` and flushes the underlying writer
    pub fn write(&mut self, cloud: &PointCloud) -> Result<()> {
        let with_intensity = !cloud.is_empty() && cloud.iter().all(|p| p.intensity.is_some());
        let with_ring = !cloud.is_empty() && cloud.iter().all(|p| p.ring.is_some());
        let with_surface = !cloud.is_empty() && cloud.has_surfaces();

        writeln!(
            self.writer,
            "# {} format {}",
            cloud.header().frame_id,
            format_string(with_intensity, with_ring, with_surface)
        )?;
        let mut columns: Vec<String> = Vec::with_capacity(9);
        for point in cloud.iter() {
            columns.clear();
            columns.extend(point.position.iter().map(|v| v.to_string()));
            if let (true, Some(intensity)) = (with_intensity, point.intensity) {
                columns.push(intensity.to_string());
            }
            if let (true, Some(ring)) = (with_ring, point.ring) {
                columns.push(ring.to_string());
            }
            if let (true, Some(surface)) = (with_surface, point.surface()) {
                columns.extend(surface.normal.iter().map(|v| v.to_string()));
                columns.push(surface.curvature.to_string());
            }
            writeln!(self.writer, "{}", columns.join(&self.delimiter))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn format_string(with_intensity: bool, with_ring: bool, with_surface: bool) -> String {
    let mut fields = vec![
        PointField::CoordinateX,
        PointField::CoordinateY,
        PointField::CoordinateZ,
    ];
    if with_intensity {
        fields.push(PointField::Intensity);
    }
    if with_ring {
        fields.push(PointField::Ring);
    }
    if with_surface {
        // normal and curvature are not read back
        fields.extend(&[PointField::Skip; 4]);
    }
    fields.into_iter().map(PointField::literal).collect()
}
