use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;
use ttf_parser::Face;

use crate::model::RunFormatting;

/// Text measurement primitive. Widths are in points for the run's font size.
pub trait TextMeasurer {
    fn char_width(&self, ch: char, fmt: &RunFormatting) -> f32;

    fn text_width(&self, text: &str, fmt: &RunFormatting) -> f32 {
        text.chars().map(|ch| self.char_width(ch, fmt)).sum()
    }

    /// (ascender - descender + line gap) / units-per-em.
    fn line_height_ratio(&self, _fmt: &RunFormatting) -> f32 {
        1.2
    }

    /// ascender / units-per-em.
    fn ascent_ratio(&self, _fmt: &RunFormatting) -> f32 {
        0.75
    }
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for &T {
    fn char_width(&self, ch: char, fmt: &RunFormatting) -> f32 {
        (**self).char_width(ch, fmt)
    }

    fn text_width(&self, text: &str, fmt: &RunFormatting) -> f32 {
        (**self).text_width(text, fmt)
    }

    fn line_height_ratio(&self, fmt: &RunFormatting) -> f32 {
        (**self).line_height_ratio(fmt)
    }

    fn ascent_ratio(&self, fmt: &RunFormatting) -> f32 {
        (**self).ascent_ratio(fmt)
    }
}

/// Approximate Helvetica advance for a character at 1000 units/em.
fn helvetica_width_1000(ch: char) -> f32 {
    match ch {
        ' ' | '\u{00A0}' => 278.0,
        '!'..='/' => 333.0,
        '0'..='9' => 556.0,
        ':'..='@' => 333.0,
        'I' | 'J' => 278.0,
        'M' | 'W' => 833.0,
        'A'..='Z' => 667.0,
        '['..='`' => 333.0,
        'f' | 'i' | 'j' | 'l' | 't' => 278.0,
        'm' | 'w' => 833.0,
        'a'..='z' => 556.0,
        '\u{200B}' | '\u{FEFF}' => 0.0,
        c if c.is_control() => 0.0,
        _ => 556.0,
    }
}

/// Font-free metrics: a Helvetica-like width table, 1.2 line height, 0.75
/// ascent. Deterministic, so layout tests do not depend on installed fonts.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackMetrics;

impl TextMeasurer for FallbackMetrics {
    fn char_width(&self, ch: char, fmt: &RunFormatting) -> f32 {
        let w = helvetica_width_1000(ch) * fmt.font_size / 1000.0;
        if fmt.bold { w * 1.05 } else { w }
    }
}

pub(crate) fn primary_font_name(name: &str) -> &str {
    name.split(';').next().unwrap_or(name).trim()
}

pub(crate) fn font_key(fmt: &RunFormatting) -> String {
    let base = primary_font_name(&fmt.font_family);
    match (fmt.bold, fmt.italic) {
        (true, true) => format!("{}/BI", base),
        (true, false) => format!("{}/B", base),
        (false, true) => format!("{}/I", base),
        (false, false) => base.to_string(),
    }
}

/// (lowercase family name, bold, italic) -> (file path, face index within TTC)
type FontLookup = HashMap<(String, bool, bool), (PathBuf, u32)>;

static FONT_INDEX: OnceLock<FontLookup> = OnceLock::new();

fn font_directories() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Ok(val) = std::env::var("DOCXIDE_FONTS") {
        dirs.extend(std::env::split_paths(&val).filter(|p| !p.as_os_str().is_empty()));
    }

    #[cfg(target_os = "macos")]
    {
        dirs.extend([
            "/Library/Fonts".into(),
            "/System/Library/Fonts".into(),
            "/System/Library/Fonts/Supplemental".into(),
        ]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.extend(["/usr/share/fonts".into(), "/usr/local/share/fonts".into()]);
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        let windir = std::env::var("WINDIR").unwrap_or_else(|_| "C:\\Windows".into());
        dirs.push(PathBuf::from(windir).join("Fonts"));
    }

    dirs
}

fn is_font_file(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("ttf" | "otf" | "ttc")
    )
}

fn map_file(path: &Path) -> Option<Mmap> {
    let file = std::fs::File::open(path).ok()?;
    // SAFETY: font files are opened read-only and not expected to change while mapped.
    unsafe { Mmap::map(&file) }.ok()
}

fn font_family_name(face: &Face) -> Option<String> {
    // Name ID 1 (Family) keeps "Aptos Display" distinct from "Aptos".
    face.names()
        .into_iter()
        .filter(|name| name.name_id == ttf_parser::name_id::FAMILY && name.is_unicode())
        .find_map(|name| name.to_string())
}

fn scan_font_dirs() -> FontLookup {
    let t0 = std::time::Instant::now();
    let mut index = FontLookup::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut files_parsed = 0u32;

    let mut stack = font_directories();
    while let Some(dir) = stack.pop() {
        if !visited.insert(dir.clone()) {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if !is_font_file(&path) {
                continue;
            }
            let Some(data) = map_file(&path) else {
                continue;
            };
            files_parsed += 1;
            let face_count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
            for face_idx in 0..face_count {
                let Ok(face) = Face::parse(&data, face_idx) else {
                    continue;
                };
                if let Some(family) = font_family_name(&face) {
                    index
                        .entry((family.to_lowercase(), face.is_bold(), face.is_italic()))
                        .or_insert((path.clone(), face_idx));
                }
            }
        }
    }

    log::info!(
        "Font scan: {:.1}ms, {} dirs, {} files parsed → {} entries",
        t0.elapsed().as_secs_f64() * 1000.0,
        visited.len(),
        files_parsed,
        index.len(),
    );
    index
}

/// Look up a font file by family and style; falls back to the regular face.
fn find_font_file(family: &str, bold: bool, italic: bool) -> Option<(PathBuf, u32)> {
    let index = FONT_INDEX.get_or_init(scan_font_dirs);
    let key = family.to_lowercase();
    index
        .get(&(key.clone(), bold, italic))
        .or_else(|| {
            if bold || italic {
                index.get(&(key, false, false))
            } else {
                None
            }
        })
        .cloned()
}

struct FontEntry {
    data: Mmap,
    face_index: u32,
    units_per_em: f32,
    line_h_ratio: f32,
    ascender_ratio: f32,
    /// Advance widths in 1000-units, filled on first use of each char.
    widths_1000: RefCell<HashMap<char, f32>>,
}

impl FontEntry {
    fn load(path: &Path, face_index: u32) -> Option<Self> {
        let data = map_file(path)?;
        let (units_per_em, line_h_ratio, ascender_ratio) = {
            let face = Face::parse(&data, face_index).ok()?;
            let units = face.units_per_em() as f32;
            let line_gap = face.line_gap() as f32;
            (
                units,
                (face.ascender() as f32 - face.descender() as f32 + line_gap) / units,
                face.ascender() as f32 / units,
            )
        };
        Some(Self {
            data,
            face_index,
            units_per_em,
            line_h_ratio,
            ascender_ratio,
            widths_1000: RefCell::new(HashMap::new()),
        })
    }

    fn char_width_1000(&self, ch: char) -> f32 {
        if let Some(&w) = self.widths_1000.borrow().get(&ch) {
            return w;
        }
        let w = Face::parse(&self.data, self.face_index)
            .ok()
            .and_then(|face| face.glyph_index(ch).and_then(|gid| face.glyph_hor_advance(gid)))
            .map(|adv| adv as f32 / self.units_per_em * 1000.0)
            .unwrap_or_else(|| helvetica_width_1000(ch));
        self.widths_1000.borrow_mut().insert(ch, w);
        w
    }
}

/// Metrics from real font files found on the system (plus `DOCXIDE_FONTS`).
/// Families that cannot be resolved fall back to [`FallbackMetrics`].
#[derive(Default)]
pub struct FontBook {
    entries: RefCell<HashMap<String, Option<std::rc::Rc<FontEntry>>>>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, fmt: &RunFormatting) -> Option<std::rc::Rc<FontEntry>> {
        let key = font_key(fmt);
        if let Some(cached) = self.entries.borrow().get(&key) {
            return cached.clone();
        }
        let t0 = std::time::Instant::now();
        let loaded = fmt
            .font_family
            .split(';')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .find_map(|candidate| {
                find_font_file(candidate, fmt.bold, fmt.italic)
                    .and_then(|(path, face_index)| FontEntry::load(&path, face_index))
            })
            .map(std::rc::Rc::new);
        if loaded.is_none() {
            log::warn!(
                "Font not found: {} bold={} italic={}, using fallback metrics",
                fmt.font_family,
                fmt.bold,
                fmt.italic
            );
        } else {
            log::debug!(
                "load font: {key} → {:.1}ms",
                t0.elapsed().as_secs_f64() * 1000.0
            );
        }
        self.entries.borrow_mut().insert(key, loaded.clone());
        loaded
    }
}

impl TextMeasurer for FontBook {
    fn char_width(&self, ch: char, fmt: &RunFormatting) -> f32 {
        match self.entry(fmt) {
            Some(entry) => entry.char_width_1000(ch) * fmt.font_size / 1000.0,
            None => FallbackMetrics.char_width(ch, fmt),
        }
    }

    fn text_width(&self, text: &str, fmt: &RunFormatting) -> f32 {
        match self.entry(fmt) {
            Some(entry) => text
                .chars()
                .map(|ch| entry.char_width_1000(ch) * fmt.font_size / 1000.0)
                .sum(),
            None => FallbackMetrics.text_width(text, fmt),
        }
    }

    fn line_height_ratio(&self, fmt: &RunFormatting) -> f32 {
        self.entry(fmt).map(|e| e.line_h_ratio).unwrap_or(1.2)
    }

    fn ascent_ratio(&self, fmt: &RunFormatting) -> f32 {
        self.entry(fmt).map(|e| e.ascender_ratio).unwrap_or(0.75)
    }
}
