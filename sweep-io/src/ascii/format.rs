use anyhow::{bail, Result};

// Meaning of one column of an ascii point file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PointField {
    Skip,
    CoordinateX,
    CoordinateY,
    CoordinateZ,
    Intensity, //F32
    Ring,      //U16
}

impl std::fmt::Display for PointField {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl PointField {
    //s - skip this column
    //x - x coordinate
    //y - y coordinate
    //z - z coordinate
    //i - intensity
    //r - ring (laser id)
    pub(crate) fn parse_format(format: &str) -> Result<Vec<PointField>> {
        let mut fields = Vec::<PointField>::new();
        for character in format.chars() {
            let field = match character {
                's' => PointField::Skip,
                'x' => PointField::CoordinateX,
                'y' => PointField::CoordinateY,
                'z' => PointField::CoordinateZ,
                'i' => PointField::Intensity,
                'r' => PointField::Ring,
                _ => {
                    bail!(
                        "FormatError can't interpret format literal '{}' in format string '{}'.",
                        character,
                        format
                    );
                }
            };
            if field != PointField::Skip && fields.contains(&field) {
                bail!(
                    "FormatError format literal '{}' appears more than once in format string '{}'.",
                    character,
                    format
                );
            }
            fields.push(field);
        }
        for (field, literal) in &[
            (PointField::CoordinateX, 'x'),
            (PointField::CoordinateY, 'y'),
            (PointField::CoordinateZ, 'z'),
        ] {
            if !fields.contains(field) {
                bail!(
                    "FormatError format string '{}' is missing the literal '{}'.",
                    format,
                    literal
                );
            }
        }
        Ok(fields)
    }

    pub(crate) fn literal(self) -> char {
        match self {
            PointField::Skip => 's',
            PointField::CoordinateX => 'x',
            PointField::CoordinateY => 'y',
            PointField::CoordinateZ => 'z',
            PointField::Intensity => 'i',
            PointField::Ring => 'r',
        }
    }
}
