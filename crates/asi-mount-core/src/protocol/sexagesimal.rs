//! Sexagesimal fields
//!
//! The mount reports angles, times and dates as fixed-width digit groups
//! separated by single delimiter characters:
//!
//! - `HH:MM:SS` right ascension, local time, sidereal time
//! - `+DD*MM:SS` declination, `+DD*MM` latitude, `DDD*MM` longitude
//! - `MM/DD/YY` date
//!
//! The delimiter character itself carries no meaning and is not checked
//! beyond being a single non-digit. Everything else (field count, widths,
//! ranges) is validated.

use super::ParseError;

/// One digit group, optionally with a decimal fraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    /// Integer part
    pub whole: u32,
    /// Number of digits in the integer part
    pub width: usize,
    /// Fractional part in [0, 1)
    pub fraction: f64,
}

impl Field {
    /// Integer and fraction combined
    pub fn value(&self) -> f64 {
        self.whole as f64 + self.fraction
    }
}

/// A tokenized reply: sign plus up to three fields
#[derive(Debug, Clone, PartialEq)]
pub struct Sexagesimal {
    /// Leading `-`
    pub negative: bool,
    /// Any leading sign, `+` or `-`
    pub signed: bool,
    /// Digit groups in order
    pub fields: Vec<Field>,
}

impl Sexagesimal {
    /// Combined value `d + m/60 + s/3600` with sign applied
    pub fn value(&self) -> f64 {
        let magnitude = self
            .fields
            .iter()
            .zip([1.0, 60.0, 3600.0])
            .map(|(field, scale)| field.value() / scale)
            .sum::<f64>();
        if self.negative {
            -magnitude
        } else {
            magnitude
        }
    }
}

/// Split a reply into sign and digit groups
pub fn tokenize(input: &str) -> Result<Sexagesimal, ParseError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let unexpected = |offset: usize, found: char| ParseError::UnexpectedChar {
        input: input.to_string(),
        offset,
        found,
    };

    let mut chars = text.char_indices().peekable();
    let mut negative = false;
    let mut signed = false;
    if let Some(&(_, c)) = chars.peek() {
        if c == '+' || c == '-' {
            negative = c == '-';
            signed = true;
            chars.next();
        }
    }

    let mut fields = Vec::new();
    let mut fraction_at: Option<(usize, usize)> = None;
    loop {
        let mut whole: u32 = 0;
        let mut width = 0usize;
        while let Some(&(_, c)) = chars.peek() {
            let Some(d) = c.to_digit(10) else { break };
            whole = whole
                .checked_mul(10)
                .and_then(|w| w.checked_add(d))
                .ok_or_else(|| ParseError::InvalidNumber(input.to_string()))?;
            width += 1;
            chars.next();
        }
        if width == 0 {
            return Err(match chars.peek() {
                Some(&(offset, c)) => unexpected(offset, c),
                None => ParseError::FieldCount {
                    input: input.to_string(),
                    expected: fields.len() + 1,
                    found: fields.len(),
                },
            });
        }

        let mut fraction = 0.0;
        if let Some(&(offset, '.')) = chars.peek() {
            chars.next();
            let mut scale = 0.1;
            let mut digits = 0;
            while let Some(&(_, c)) = chars.peek() {
                let Some(d) = c.to_digit(10) else { break };
                fraction += d as f64 * scale;
                scale /= 10.0;
                digits += 1;
                chars.next();
            }
            if digits == 0 {
                return Err(match chars.peek() {
                    Some(&(offset, c)) => unexpected(offset, c),
                    None => unexpected(offset, '.'),
                });
            }
            fraction_at = Some((fields.len(), offset));
        }
        fields.push(Field {
            whole,
            width,
            fraction,
        });

        match chars.next() {
            None => break,
            Some((offset, c)) if c == '+' || c == '-' || c == '.' => {
                return Err(unexpected(offset, c))
            }
            Some(_) => {
                // single delimiter, optionally trailing
                match chars.peek() {
                    None => break,
                    Some(&(_, c)) if c.is_ascii_digit() => {}
                    Some(&(offset, c)) => return Err(unexpected(offset, c)),
                }
            }
        }
    }

    if let Some((index, offset)) = fraction_at {
        if index + 1 != fields.len() {
            return Err(unexpected(offset, '.'));
        }
    }

    Ok(Sexagesimal {
        negative,
        signed,
        fields,
    })
}

/// Parse `[±]D[D[D]][:MM[:SS]]` into decimal units (degrees or hours)
pub fn parse_angle(input: &str) -> Result<f64, ParseError> {
    let parsed = tokenize(input)?;
    if parsed.fields.len() > 3 {
        return Err(ParseError::FieldCount {
            input: input.to_string(),
            expected: 3,
            found: parsed.fields.len(),
        });
    }
    for (index, field) in parsed.fields.iter().enumerate() {
        let width_ok = if index == 0 {
            (1..=3).contains(&field.width)
        } else {
            field.width == 2
        };
        if !width_ok {
            return Err(ParseError::FieldWidth {
                input: input.to_string(),
                index,
                width: field.width,
            });
        }
        if index > 0 && field.value() >= 60.0 {
            return Err(ParseError::OutOfRange {
                input: input.to_string(),
                index,
            });
        }
    }
    Ok(parsed.value())
}

/// Parse exactly three unsigned two-digit integer fields (`MM/DD/YY`, `HH:MM:SS`)
pub fn parse_triplet(input: &str) -> Result<[u32; 3], ParseError> {
    let parsed = tokenize(input)?;
    if parsed.signed {
        return Err(ParseError::UnexpectedChar {
            input: input.to_string(),
            offset: 0,
            found: input.trim().chars().next().unwrap_or('?'),
        });
    }
    if parsed.fields.len() != 3 {
        return Err(ParseError::FieldCount {
            input: input.to_string(),
            expected: 3,
            found: parsed.fields.len(),
        });
    }
    let mut out = [0u32; 3];
    for (index, field) in parsed.fields.iter().enumerate() {
        if field.width != 2 || field.fraction != 0.0 {
            return Err(ParseError::FieldWidth {
                input: input.to_string(),
                index,
                width: field.width,
            });
        }
        out[index] = field.whole;
    }
    Ok(out)
}

/// Split a magnitude into whole units, minutes and seconds after rounding
/// to `resolution` seconds
fn split(value: f64, resolution: u64) -> (u64, u64, u64) {
    let total = ((value.abs() * 3600.0) / resolution as f64).round() as u64 * resolution;
    (total / 3600, (total / 60) % 60, total % 60)
}

/// Format hours as `HH:MM:SS`, wrapping into [0, 24)
pub fn format_hms(hours: f64) -> String {
    let wrapped = hours.rem_euclid(24.0);
    let (h, m, s) = split(wrapped, 1);
    format!("{:02}:{:02}:{:02}", h % 24, m, s)
}

fn sign_of(value: f64, rounded_zero: bool) -> char {
    if value < 0.0 && !rounded_zero {
        '-'
    } else {
        '+'
    }
}

/// Format degrees as `±DD*MM:SS`
pub fn format_dms(degrees: f64) -> String {
    let (d, m, s) = split(degrees, 1);
    let sign = sign_of(degrees, d == 0 && m == 0 && s == 0);
    format!("{}{:02}*{:02}:{:02}", sign, d, m, s)
}

/// Format degrees as `±DD*MM`
pub fn format_dm(degrees: f64) -> String {
    let (d, m, _) = split(degrees, 60);
    let sign = sign_of(degrees, d == 0 && m == 0);
    format!("{}{:02}*{:02}", sign, d, m)
}

/// Format degrees in [0, 360) as `DDD*MM`
pub fn format_ddd_mm(degrees: f64) -> String {
    let (d, m, _) = split(degrees.rem_euclid(360.0), 60);
    format!("{:03}*{:02}", d % 360, m)
}
