use pnv::bridge::Theme;
use pnv::cache::ResponseSource;
use ratatui::prelude::{Color, Style};

/// Colors for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
  pub fg: Color,
  pub bg: Color,
  pub bar: Color,
  pub accent: Color,
  pub dim: Color,
  pub highlight: Color,
}

impl Palette {
  pub fn base(&self) -> Style {
    Style::default().fg(self.fg).bg(self.bg)
  }

  pub fn bar(&self) -> Style {
    Style::default().bg(self.bar)
  }
}

pub fn palette(theme: Theme) -> Palette {
  match theme {
    Theme::Light => Palette {
      fg: Color::Black,
      bg: Color::White,
      bar: Color::Gray,
      accent: Color::Blue,
      dim: Color::DarkGray,
      highlight: Color::Gray,
    },
    Theme::Dark => Palette {
      fg: Color::White,
      bg: Color::Reset,
      bar: Color::Black,
      accent: Color::Cyan,
      dim: Color::DarkGray,
      highlight: Color::DarkGray,
    },
  }
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Get the display color for an HTTP status
pub fn status_color(status: u16) -> Color {
  match status {
    200..=299 => Color::Green,
    300..=399 => Color::Yellow,
    _ => Color::Red,
  }
}

/// Get the display color for where a response came from
pub fn source_color(source: ResponseSource) -> Color {
  match source {
    ResponseSource::Cache => Color::Green,
    ResponseSource::Network => Color::Blue,
    ResponseSource::OfflineFallback => Color::Yellow,
    ResponseSource::Passthrough => Color::Magenta,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("/Tools/bd-tax-calculator.html", 12), "/Tools/bd...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("Back online! ✓✓✓", 14), "Back online...");
  }

  #[test]
  fn test_status_color() {
    assert_eq!(status_color(200), Color::Green);
    assert_eq!(status_color(304), Color::Yellow);
    assert_eq!(status_color(404), Color::Red);
    assert_eq!(status_color(503), Color::Red);
  }

  #[test]
  fn test_themes_differ() {
    assert_ne!(palette(Theme::Light), palette(Theme::Dark));
    assert_eq!(source_color(ResponseSource::Cache), Color::Green);
  }
}
