//! CSS colour recognition and the palettes used by mapper transforms.
//!
//! Colours are packed as `0xRRGGBBAA` when stored in numeric columns.

use once_cell::sync::Lazy;
use regex::Regex;

/// An RGBA colour with 8-bit channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn opaque(rgb: u32) -> Self {
        Self {
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
            a: 0xff,
        }
    }

    /// Pack as `0xRRGGBBAA`.
    pub fn pack(&self) -> u32 {
        u32::from_be_bytes([self.r, self.g, self.b, self.a])
    }
}

static FUNCTIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(rgba?|hsla?)\(\s*([^,\s]+)\s*,\s*([^,\s]+)\s*,\s*([^,\s]+)\s*",
        r"(?:,\s*([^,\s]+)\s*)?\)$",
    ))
    .unwrap()
});

/// Parse a CSS colour string: hex, `rgb[a]()`, `hsl[a]()`, or a named colour.
pub fn parse_css_color(input: &str) -> Option<Rgba> {
    let s = input.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if s == "transparent" {
        return Some(Rgba {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        });
    }
    if let Some(caps) = FUNCTIONAL.captures(&s) {
        let func = &caps[1];
        let has_alpha = caps.get(5).is_some();
        if func.ends_with('a') != has_alpha {
            return None;
        }
        let alpha = match caps.get(5) {
            Some(a) => parse_alpha(a.as_str())?,
            None => 0xff,
        };
        return if func.starts_with("rgb") {
            Some(Rgba {
                r: parse_channel(&caps[2])?,
                g: parse_channel(&caps[3])?,
                b: parse_channel(&caps[4])?,
                a: alpha,
            })
        } else {
            let h: f64 = caps[2].trim_end_matches("deg").parse().ok()?;
            let sat = parse_percent(&caps[3])?;
            let light = parse_percent(&caps[4])?;
            let (r, g, b) = hsl_to_rgb(h, sat, light);
            Some(Rgba { r, g, b, a: alpha })
        };
    }
    NAMED_COLORS
        .binary_search_by(|(name, _)| name.cmp(&s.as_str()))
        .ok()
        .map(|i| Rgba::opaque(NAMED_COLORS[i].1))
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|n| n * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Rgba {
            r: nibble(0)?,
            g: nibble(1)?,
            b: nibble(2)?,
            a: 0xff,
        }),
        4 => Some(Rgba {
            r: nibble(0)?,
            g: nibble(1)?,
            b: nibble(2)?,
            a: nibble(3)?,
        }),
        6 => Some(Rgba {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: 0xff,
        }),
        8 => Some(Rgba {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: byte(6)?,
        }),
        _ => None,
    }
}

fn parse_channel(s: &str) -> Option<u8> {
    let value = match s.strip_suffix('%') {
        Some(pct) => pct.parse::<f64>().ok()? * 2.55,
        None => s.parse::<f64>().ok()?,
    };
    (0.0..=255.0)
        .contains(&value)
        .then(|| value.round() as u8)
}

fn parse_percent(s: &str) -> Option<f64> {
    let value = s.strip_suffix('%')?.parse::<f64>().ok()?;
    (0.0..=100.0).contains(&value).then_some(value / 100.0)
}

fn parse_alpha(s: &str) -> Option<u8> {
    let value = match s.strip_suffix('%') {
        Some(pct) => pct.parse::<f64>().ok()? / 100.0,
        None => s.parse::<f64>().ok()?,
    };
    (0.0..=1.0)
        .contains(&value)
        .then(|| (value * 255.0).round() as u8)
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let h = h.rem_euclid(360.0) / 360.0;
    if s == 0.0 {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let channel = |t: f64| {
        let t = t.rem_euclid(1.0);
        let v = if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        };
        (v * 255.0).round() as u8
    };
    (channel(h + 1.0 / 3.0), channel(h), channel(h - 1.0 / 3.0))
}

/// Qualitative palette for community-like categorical values.
pub static QUALITATIVE: &[Rgba] = &[
    Rgba::opaque(0xa6cee3),
    Rgba::opaque(0x1f78b4),
    Rgba::opaque(0xb2df8a),
    Rgba::opaque(0x33a02c),
    Rgba::opaque(0xfb9a99),
    Rgba::opaque(0xe31a1c),
    Rgba::opaque(0xfdbf6f),
    Rgba::opaque(0xff7f00),
    Rgba::opaque(0xcab2d6),
    Rgba::opaque(0x6a3d9a),
    Rgba::opaque(0xffff99),
    Rgba::opaque(0xb15928),
];

/// Sequential green-to-red palette for magnitude values.
pub static GREEN_TO_RED: &[Rgba] = &[
    Rgba::opaque(0x006837),
    Rgba::opaque(0x1a9850),
    Rgba::opaque(0x66bd63),
    Rgba::opaque(0xa6d96a),
    Rgba::opaque(0xd9ef8b),
    Rgba::opaque(0xffffbf),
    Rgba::opaque(0xfee08b),
    Rgba::opaque(0xfdae61),
    Rgba::opaque(0xf46d43),
    Rgba::opaque(0xd73027),
    Rgba::opaque(0xa50026),
];

/// Palette backing category bindings.
static CATEGORICAL: &[Rgba] = &[
    Rgba::opaque(0x1f77b4),
    Rgba::opaque(0xff7f0e),
    Rgba::opaque(0x2ca02c),
    Rgba::opaque(0xd62728),
    Rgba::opaque(0x9467bd),
    Rgba::opaque(0x8c564b),
    Rgba::opaque(0xe377c2),
    Rgba::opaque(0x7f7f7f),
    Rgba::opaque(0xbcbd22),
    Rgba::opaque(0x17becf),
];

/// Packed colour bound to a category id.
pub fn palette_binding(category: f64) -> f64 {
    if !category.is_finite() {
        return CATEGORICAL[0].pack() as f64;
    }
    let idx = (category.trunc() as i64).rem_euclid(CATEGORICAL.len() as i64) as usize;
    CATEGORICAL[idx].pack() as f64
}

/// Map palette indices to packed colours, clamping out-of-range indices.
pub fn int2color(indices: &[f64], palette: &[Rgba]) -> Vec<f64> {
    let last = palette.len().saturating_sub(1);
    indices
        .iter()
        .map(|&i| {
            let idx = if i.is_finite() && i > 0.0 {
                (i as usize).min(last)
            } else {
                0
            };
            palette.get(idx).map(|c| c.pack() as f64).unwrap_or(0.0)
        })
        .collect()
}

/// CSS named colours, sorted by name.
static NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xf0f8ff),
    ("antiquewhite", 0xfaebd7),
    ("aqua", 0x00ffff),
    ("aquamarine", 0x7fffd4),
    ("azure", 0xf0ffff),
    ("beige", 0xf5f5dc),
    ("bisque", 0xffe4c4),
    ("black", 0x000000),
    ("blanchedalmond", 0xffebcd),
    ("blue", 0x0000ff),
    ("blueviolet", 0x8a2be2),
    ("brown", 0xa52a2a),
    ("burlywood", 0xdeb887),
    ("cadetblue", 0x5f9ea0),
    ("chartreuse", 0x7fff00),
    ("chocolate", 0xd2691e),
    ("coral", 0xff7f50),
    ("cornflowerblue", 0x6495ed),
    ("cornsilk", 0xfff8dc),
    ("crimson", 0xdc143c),
    ("cyan", 0x00ffff),
    ("darkblue", 0x00008b),
    ("darkcyan", 0x008b8b),
    ("darkgoldenrod", 0xb8860b),
    ("darkgray", 0xa9a9a9),
    ("darkgreen", 0x006400),
    ("darkgrey", 0xa9a9a9),
    ("darkkhaki", 0xbdb76b),
    ("darkmagenta", 0x8b008b),
    ("darkolivegreen", 0x556b2f),
    ("darkorange", 0xff8c00),
    ("darkorchid", 0x9932cc),
    ("darkred", 0x8b0000),
    ("darksalmon", 0xe9967a),
    ("darkseagreen", 0x8fbc8f),
    ("darkslateblue", 0x483d8b),
    ("darkslategray", 0x2f4f4f),
    ("darkslategrey", 0x2f4f4f),
    ("darkturquoise", 0x00ced1),
    ("darkviolet", 0x9400d3),
    ("deeppink", 0xff1493),
    ("deepskyblue", 0x00bfff),
    ("dimgray", 0x696969),
    ("dimgrey", 0x696969),
    ("dodgerblue", 0x1e90ff),
    ("firebrick", 0xb22222),
    ("floralwhite", 0xfffaf0),
    ("forestgreen", 0x228b22),
    ("fuchsia", 0xff00ff),
    ("gainsboro", 0xdcdcdc),
    ("ghostwhite", 0xf8f8ff),
    ("gold", 0xffd700),
    ("goldenrod", 0xdaa520),
    ("gray", 0x808080),
    ("green", 0x008000),
    ("greenyellow", 0xadff2f),
    ("grey", 0x808080),
    ("honeydew", 0xf0fff0),
    ("hotpink", 0xff69b4),
    ("indianred", 0xcd5c5c),
    ("indigo", 0x4b0082),
    ("ivory", 0xfffff0),
    ("khaki", 0xf0e68c),
    ("lavender", 0xe6e6fa),
    ("lavenderblush", 0xfff0f5),
    ("lawngreen", 0x7cfc00),
    ("lemonchiffon", 0xfffacd),
    ("lightblue", 0xadd8e6),
    ("lightcoral", 0xf08080),
    ("lightcyan", 0xe0ffff),
    ("lightgoldenrodyellow", 0xfafad2),
    ("lightgray", 0xd3d3d3),
    ("lightgreen", 0x90ee90),
    ("lightgrey", 0xd3d3d3),
    ("lightpink", 0xffb6c1),
    ("lightsalmon", 0xffa07a),
    ("lightseagreen", 0x20b2aa),
    ("lightskyblue", 0x87cefa),
    ("lightslategray", 0x778899),
    ("lightslategrey", 0x778899),
    ("lightsteelblue", 0xb0c4de),
    ("lightyellow", 0xffffe0),
    ("lime", 0x00ff00),
    ("limegreen", 0x32cd32),
    ("linen", 0xfaf0e6),
    ("magenta", 0xff00ff),
    ("maroon", 0x800000),
    ("mediumaquamarine", 0x66cdaa),
    ("mediumblue", 0x0000cd),
    ("mediumorchid", 0xba55d3),
    ("mediumpurple", 0x9370db),
    ("mediumseagreen", 0x3cb371),
    ("mediumslateblue", 0x7b68ee),
    ("mediumspringgreen", 0x00fa9a),
    ("mediumturquoise", 0x48d1cc),
    ("mediumvioletred", 0xc71585),
    ("midnightblue", 0x191970),
    ("mintcream", 0xf5fffa),
    ("mistyrose", 0xffe4e1),
    ("moccasin", 0xffe4b5),
    ("navajowhite", 0xffdead),
    ("navy", 0x000080),
    ("oldlace", 0xfdf5e6),
    ("olive", 0x808000),
    ("olivedrab", 0x6b8e23),
    ("orange", 0xffa500),
    ("orangered", 0xff4500),
    ("orchid", 0xda70d6),
    ("palegoldenrod", 0xeee8aa),
    ("palegreen", 0x98fb98),
    ("paleturquoise", 0xafeeee),
    ("palevioletred", 0xdb7093),
    ("papayawhip", 0xffefd5),
    ("peachpuff", 0xffdab9),
    ("peru", 0xcd853f),
    ("pink", 0xffc0cb),
    ("plum", 0xdda0dd),
    ("powderblue", 0xb0e0e6),
    ("purple", 0x800080),
    ("rebeccapurple", 0x663399),
    ("red", 0xff0000),
    ("rosybrown", 0xbc8f8f),
    ("royalblue", 0x4169e1),
    ("saddlebrown", 0x8b4513),
    ("salmon", 0xfa8072),
    ("sandybrown", 0xf4a460),
    ("seagreen", 0x2e8b57),
    ("seashell", 0xfff5ee),
    ("sienna", 0xa0522d),
    ("silver", 0xc0c0c0),
    ("skyblue", 0x87ceeb),
    ("slateblue", 0x6a5acd),
    ("slategray", 0x708090),
    ("slategrey", 0x708090),
    ("snow", 0xfffafa),
    ("springgreen", 0x00ff7f),
    ("steelblue", 0x4682b4),
    ("tan", 0xd2b48c),
    ("teal", 0x008080),
    ("thistle", 0xd8bfd8),
    ("tomato", 0xff6347),
    ("turquoise", 0x40e0d0),
    ("violet", 0xee82ee),
    ("wheat", 0xf5deb3),
    ("white", 0xffffff),
    ("whitesmoke", 0xf5f5f5),
    ("yellow", 0xffff00),
    ("yellowgreen", 0x9acd32),
];
