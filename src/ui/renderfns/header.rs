use super::Palette;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with logo, origin, controller version, and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  colors: &Palette,
  origin: &str,
  version: &str,
  online: bool,
) {
  let domain = extract_domain(origin);
  let (link, link_color) = if online {
    ("online", Color::Green)
  } else {
    ("offline", Color::Red)
  };

  let header = Line::from(vec![
    Span::styled(" pnv ", Style::default().fg(colors.accent).bold()),
    Span::styled("│", Style::default().fg(colors.dim)),
    Span::styled(format!(" {} ", domain), Style::default().fg(colors.fg)),
    Span::styled("│", Style::default().fg(colors.dim)),
    Span::styled(format!(" {} ", version), Style::default().fg(Color::Yellow).bold()),
    Span::styled("│", Style::default().fg(colors.dim)),
    Span::styled(format!(" {} ", link), Style::default().fg(link_color)),
    Span::raw("  "),
    // Shortcuts - keys and brackets highlighted, descriptions dimmed
    Span::styled("<enter>", Style::default().fg(colors.accent)),
    Span::styled(" fetch", Style::default().fg(colors.dim)),
    Span::raw("   "),
    Span::styled("<r>", Style::default().fg(colors.accent)),
    Span::styled(" check update", Style::default().fg(colors.dim)),
    Span::raw("   "),
    Span::styled("<v>", Style::default().fg(colors.accent)),
    Span::styled(" version", Style::default().fg(colors.dim)),
    Span::raw("   "),
    Span::styled("<t>", Style::default().fg(colors.accent)),
    Span::styled(" theme", Style::default().fg(colors.dim)),
    Span::raw("   "),
    Span::styled("<q>", Style::default().fg(colors.accent)),
    Span::styled(" quit", Style::default().fg(colors.dim)),
  ]);

  let paragraph = Paragraph::new(header).style(colors.bar());

  frame.render_widget(paragraph, area);
}

/// Extract domain from the site origin
fn extract_domain(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_domain() {
    assert_eq!(extract_domain("https://peranaivai.com/"), "peranaivai.com");
    assert_eq!(
      extract_domain("https://tools.example.org/Tools/"),
      "tools.example.org"
    );
    assert_eq!(extract_domain("http://localhost:5173"), "localhost:5173");
  }
}
