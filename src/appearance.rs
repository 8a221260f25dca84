//! Appearance streams for filled text fields.
//!
//! Setting `/V` on a text field does not change what is drawn: viewers (and
//! flattening) use the widget's `/AP` stream. This module lays out a value
//! inside a widget rectangle with the standard Helvetica metrics and produces
//! the content of a replacement appearance stream.

/// Resource name under which the appearance streams expect Helvetica.
pub const FONT_RESOURCE_NAME: &str = "Helv";

const PADDING: f32 = 2.0;
const LINE_HEIGHT_FACTOR: f32 = 1.15;
const MAX_AUTO_FONT_SIZE: f32 = 12.0;
const MIN_AUTO_FONT_SIZE: f32 = 4.0;
const AUTO_FONT_STEP: f32 = 0.5;
const DESCENT_FACTOR: f32 = 0.207;
const ASCENT_FACTOR: f32 = 0.718;
const DEFAULT_GLYPH_WIDTH: u16 = 556;

/// Helvetica advance widths (1/1000 em) for the printable ASCII range.
const HELVETICA_ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Text alignment requested by the field's `/Q` entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Quadding {
    #[default]
    Left,
    Center,
    Right,
}

impl Quadding {
    /// Maps the integer stored under `/Q`.
    pub fn from_pdf(value: i64) -> Self {
        match value {
            1 => Self::Center,
            2 => Self::Right,
            _ => Self::Left,
        }
    }
}

/// Parsed form of a `/DA` (default appearance) string.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultAppearance {
    /// Requested font size; `0` asks for auto-sizing.
    pub font_size: f32,
    /// Color operator with its operands, e.g. `0 g` or `0.1 0.2 0.5 rg`.
    pub color: String,
}

impl Default for DefaultAppearance {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            color: "0 g".to_owned(),
        }
    }
}

impl DefaultAppearance {
    /// Extracts the font size and fill color from a `/DA` string.
    ///
    /// The font name is ignored: appearances are always drawn with Helvetica.
    pub fn parse(da: &[u8]) -> Self {
        let text = String::from_utf8_lossy(da);
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let mut appearance = Self::default();

        for (index, token) in tokens.iter().enumerate() {
            let operands = match *token {
                "Tf" => {
                    if let Some(size) = index
                        .checked_sub(1)
                        .and_then(|at| tokens[at].parse::<f32>().ok())
                    {
                        appearance.font_size = size.max(0.0);
                    }
                    continue;
                }
                "g" => 1,
                "rg" => 3,
                "k" => 4,
                _ => continue,
            };
            if index < operands {
                continue;
            }
            let start = index - operands;
            if tokens[start..index]
                .iter()
                .all(|operand| operand.parse::<f32>().is_ok())
            {
                appearance.color = tokens[start..=index].join(" ");
            }
        }

        appearance
    }
}

/// Geometry and style of a text widget.
#[derive(Clone, Debug, PartialEq)]
pub struct TextAppearance {
    pub width: f32,
    pub height: f32,
    pub multiline: bool,
    pub quadding: Quadding,
    pub default_appearance: DefaultAppearance,
}

impl TextAppearance {
    /// Builds the content stream drawing `value` inside the widget.
    pub fn content(&self, value: &str) -> Vec<u8> {
        let inner_width = (self.width - 2.0 * PADDING).max(1.0);
        let inner_height = (self.height - 2.0 * PADDING).max(1.0);

        let (font_size, lines) = if self.multiline {
            self.layout_multiline(value, inner_width, inner_height)
        } else {
            let line = value.replace(['\r', '\n'], " ");
            let size = self.single_line_size(&line, inner_width, inner_height);
            (size, vec![line])
        };

        let mut content = Vec::new();
        content.extend_from_slice(b"/Tx BMC\nq\n");
        content.extend_from_slice(
            format!(
                "{} {} {} {} re W n\n",
                format_number(1.0),
                format_number(1.0),
                format_number((self.width - 2.0).max(0.0)),
                format_number((self.height - 2.0).max(0.0)),
            )
            .as_bytes(),
        );
        content.extend_from_slice(b"BT\n");
        content.extend_from_slice(
            format!("/{} {} Tf\n", FONT_RESOURCE_NAME, format_number(font_size)).as_bytes(),
        );
        content.extend_from_slice(self.default_appearance.color.as_bytes());
        content.push(b'\n');

        let leading = font_size * LINE_HEIGHT_FACTOR;
        let first_baseline = if self.multiline {
            self.height - PADDING - font_size * ASCENT_FACTOR
        } else {
            (self.height - font_size) / 2.0 + font_size * DESCENT_FACTOR
        };

        for (index, line) in lines.iter().enumerate() {
            let line_width = text_width(line, font_size);
            let x = match self.quadding {
                Quadding::Left => PADDING,
                Quadding::Center => (self.width - line_width) / 2.0,
                Quadding::Right => self.width - PADDING - line_width,
            };
            let y = first_baseline - leading * index as f32;
            content.extend_from_slice(
                format!("1 0 0 1 {} {} Tm\n", format_number(x), format_number(y)).as_bytes(),
            );
            content.push(b'(');
            content.extend(escape_literal(&encode_win_ansi(line)));
            content.extend_from_slice(b") Tj\n");
        }

        content.extend_from_slice(b"ET\nQ\nEMC\n");
        content
    }

    fn single_line_size(&self, line: &str, inner_width: f32, inner_height: f32) -> f32 {
        if self.default_appearance.font_size > 0.0 {
            return self.default_appearance.font_size;
        }
        let mut size = (inner_height / LINE_HEIGHT_FACTOR).min(MAX_AUTO_FONT_SIZE);
        let width_at_one = text_width(line, 1.0);
        if width_at_one > 0.0 {
            size = size.min(inner_width / width_at_one);
        }
        size.max(MIN_AUTO_FONT_SIZE)
    }

    fn layout_multiline(
        &self,
        value: &str,
        inner_width: f32,
        inner_height: f32,
    ) -> (f32, Vec<String>) {
        if self.default_appearance.font_size > 0.0 {
            let size = self.default_appearance.font_size;
            return (size, wrap_text(value, size, inner_width));
        }

        let mut size = MAX_AUTO_FONT_SIZE;
        loop {
            let lines = wrap_text(value, size, inner_width);
            let needed = lines.len() as f32 * size * LINE_HEIGHT_FACTOR;
            if needed <= inner_height || size <= MIN_AUTO_FONT_SIZE {
                return (size, lines);
            }
            size = (size - AUTO_FONT_STEP).max(MIN_AUTO_FONT_SIZE);
        }
    }
}

fn glyph_width(c: char) -> u16 {
    match c {
        ' '..='~' => HELVETICA_ASCII_WIDTHS[c as usize - 0x20],
        'À'..='Å' | 'È'..='Ë' => 667,
        'Ç' | 'Ò'..='Ö' | 'Ù'..='Ü' => 722,
        'Ì'..='Ï' | 'ì'..='ï' => 278,
        'ç' => 500,
        'Œ' => 1000,
        'œ' => 944,
        '’' | '‘' => 222,
        '“' | '”' => 333,
        '–' => 556,
        '—' | '…' | '€' => 1000,
        _ => DEFAULT_GLYPH_WIDTH,
    }
}

/// Width in points of `text` drawn in Helvetica at `font_size`.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(glyph_width(c))).sum();
    units as f32 * font_size / 1000.0
}

/// Greedy word wrap honoring explicit line breaks.
pub fn wrap_text(text: &str, font_size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim_end_matches('\r');
        let mut current = String::new();

        for word in paragraph.split(' ') {
            let candidate = if current.is_empty() {
                word.to_owned()
            } else {
                format!("{current} {word}")
            };
            if text_width(&candidate, font_size) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            // Words wider than the box are split between characters.
            for c in word.chars() {
                current.push(c);
                if current.chars().count() > 1 && text_width(&current, font_size) > max_width {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }

        lines.push(current);
    }

    lines
}

/// Encodes text for a simple font using `WinAnsiEncoding`.
///
/// Characters outside the encoding are replaced with `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            'Œ' => 0x8c,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            'œ' => 0x9c,
            'Ÿ' => 0x9f,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// Escapes the delimiters of a PDF literal string.
pub fn escape_literal(bytes: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                escaped.push(b'\\');
                escaped.push(byte);
            }
            b'\r' => escaped.extend_from_slice(b"\\r"),
            b'\n' => escaped.extend_from_slice(b"\\n"),
            _ => escaped.push(byte),
        }
    }
    escaped
}

/// Encodes a value for a PDF text string (`/V`, `/TU`...).
///
/// ASCII stays a literal byte string; anything else becomes UTF-16BE with a
/// byte order mark.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xfe, 0xff];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

/// Formats a number for a content stream without exponent notation.
pub fn format_number(value: f32) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let text = format!("{rounded:.2}");
        text.trim_end_matches('0').to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_font_size_and_color() {
        let da = DefaultAppearance::parse(b"/Helv 10 Tf 0 0 1 rg");
        assert_eq!(da.font_size, 10.0);
        assert_eq!(da.color, "0 0 1 rg");

        let auto = DefaultAppearance::parse(b"/TiRo 0 Tf 0 g");
        assert_eq!(auto.font_size, 0.0);
        assert_eq!(auto.color, "0 g");
    }

    #[test]
    fn missing_da_defaults_to_black_auto_size() {
        assert_eq!(DefaultAppearance::parse(b""), DefaultAppearance::default());
    }

    #[test]
    fn wraps_on_words_and_explicit_breaks() {
        let lines = wrap_text("aaa bbb ccc\nddd", 10.0, text_width("aaa bbb", 10.0));
        assert_eq!(lines, ["aaa bbb", "ccc", "ddd"]);
    }

    #[test]
    fn splits_words_wider_than_the_box() {
        let lines = wrap_text("abcdef", 10.0, text_width("abc", 10.0));
        assert_eq!(lines, ["abc", "def"]);
    }

    #[test]
    fn win_ansi_keeps_french_accents() {
        assert_eq!(encode_win_ansi("é’?"), vec![0xe9, 0x92, b'?']);
        assert_eq!(encode_win_ansi("日"), vec![b'?']);
    }

    #[test]
    fn text_strings_switch_to_utf16_for_non_ascii() {
        assert_eq!(encode_text_string("XYZ"), b"XYZ".to_vec());
        assert_eq!(encode_text_string("é"), vec![0xfe, 0xff, 0x00, 0xe9]);
    }

    #[test]
    fn escapes_literal_delimiters() {
        assert_eq!(escape_literal(b"a(b)\\"), b"a\\(b\\)\\\\".to_vec());
    }

    #[test]
    fn numbers_are_plain_decimals() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(3.456), "3.46");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[test]
    fn auto_size_shrinks_long_single_lines() {
        let appearance = TextAppearance {
            width: 60.0,
            height: 20.0,
            multiline: false,
            quadding: Quadding::Left,
            default_appearance: DefaultAppearance::default(),
        };
        let content = String::from_utf8(appearance.content("Une valeur assez longue"))
            .expect("ascii content");
        assert!(content.contains("(Une valeur assez longue) Tj"));
        assert!(!content.contains("/Helv 12 Tf"));
    }
}
