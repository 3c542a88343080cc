use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};

/// Tags are `[fg:bg:flags]`; an empty part keeps the current value and `-`
/// resets it. Flags: `b d i u l r s`. Invalid tags such as `[0,1]` stay literal.
pub fn to_text(markup: &str) -> Text<'static> {
    let mut style = Style::default();
    let lines: Vec<Line<'static>> = markup
        .split('\n')
        .map(|line| {
            let (spans, next) = parse_line(line, style);
            style = next;
            Line::from(spans)
        })
        .collect();
    Text::from(lines)
}

pub fn strip(markup: &str) -> String {
    markup
        .split('\n')
        .map(|line| {
            parse_line(line, Style::default())
                .0
                .into_iter()
                .map(|span| span.content.into_owned())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_line(line: &str, mut style: Style) -> (Vec<Span<'static>>, Style) {
    let mut spans = Vec::new();
    let mut buf = String::new();
    let mut rest = line;

    while let Some(open) = rest.find('[') {
        buf.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let tag = after
            .find(']')
            .and_then(|close| apply_tag(&after[..close], style).map(|s| (close, s)));
        match tag {
            Some((close, next)) => {
                if !buf.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut buf), style));
                }
                style = next;
                rest = &after[close + 1..];
            }
            None => {
                buf.push('[');
                rest = after;
            }
        }
    }
    buf.push_str(rest);
    if !buf.is_empty() {
        spans.push(Span::styled(buf, style));
    }
    (spans, style)
}

fn apply_tag(tag: &str, mut style: Style) -> Option<Style> {
    if tag.is_empty() {
        return None;
    }
    let mut parts = tag.split(':');
    let fg = parts.next().unwrap_or("");
    let bg = parts.next().unwrap_or("");
    let flags = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return None;
    }

    match fg {
        "" => {}
        "-" => style.fg = None,
        name => style.fg = Some(parse_color(name)?),
    }
    match bg {
        "" => {}
        "-" => style.bg = None,
        name => style.bg = Some(parse_color(name)?),
    }
    match flags {
        "" => {}
        "-" => {
            style.add_modifier = Modifier::empty();
            style.sub_modifier = Modifier::empty();
        }
        flags => {
            for flag in flags.chars() {
                let modifier = match flag {
                    'b' => Modifier::BOLD,
                    'd' => Modifier::DIM,
                    'i' => Modifier::ITALIC,
                    'u' => Modifier::UNDERLINED,
                    'l' => Modifier::SLOW_BLINK,
                    'r' => Modifier::REVERSED,
                    's' => Modifier::CROSSED_OUT,
                    _ => return None,
                };
                style = style.add_modifier(modifier);
            }
        }
    }
    Some(style)
}

fn parse_color(name: &str) -> Option<Color> {
    if let Some(hex) = name.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        return Some(Color::Rgb(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
        ));
    }

    let color = match name.to_ascii_lowercase().as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" | "fuchsia" | "purple" => Color::Magenta,
        "cyan" | "aqua" | "teal" => Color::Cyan,
        "white" => Color::White,
        "gray" | "grey" | "silver" => Color::Gray,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" | "lime" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        "orange" => Color::Rgb(255, 165, 0),
        "navy" => Color::Rgb(0, 0, 128),
        "maroon" => Color::Rgb(128, 0, 0),
        "olive" => Color::Rgb(128, 128, 0),
        _ => return None,
    };
    Some(color)
}
