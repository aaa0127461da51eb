use crate::ui::renderfns::Palette;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Box of `width` x `height` anchored to the bottom right of `area`
fn bottom_right(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect::new(
    area.x + area.width - width,
    area.y + area.height - height,
    width,
    height,
  )
}

/// Box of `width` x `height` centered horizontally at the top of `area`
fn top_center(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect::new(area.x + (area.width - width) / 2, area.y, width, height)
}

fn key_hint<'a>(key: &'a str, label: &'a str, colors: &Palette) -> Vec<Span<'a>> {
  vec![
    Span::styled(key, Style::default().fg(colors.accent).bold()),
    Span::styled(label, Style::default().fg(colors.dim)),
  ]
}

/// "New Version Available" banner
pub fn draw_update_banner(frame: &mut Frame, area: Rect, colors: &Palette, version: &str) {
  let overlay = bottom_right(area, 48, 6);
  frame.render_widget(Clear, overlay);

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Green))
    .title(" New Version Available! ");

  let mut actions = key_hint("<u>", " update now   ", colors);
  actions.extend(key_hint("<l>", " later", colors));

  let text = vec![
    Line::from(Span::styled(
      "We've added new features and improvements.",
      Style::default().fg(colors.fg),
    )),
    Line::from(Span::styled(
      format!("Version {}", version),
      Style::default().fg(colors.dim),
    )),
    Line::from(""),
    Line::from(actions),
  ];

  let paragraph = Paragraph::new(text)
    .block(block)
    .style(colors.base())
    .wrap(Wrap { trim: true });
  frame.render_widget(paragraph, overlay);
}

/// Custom install prompt
pub fn draw_install_prompt(frame: &mut Frame, area: Rect, colors: &Palette) {
  let overlay = bottom_right(area, 44, 9);
  frame.render_widget(Clear, overlay);

  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(colors.accent))
    .title(" Install Pera nai Vai ");

  let benefit = |text: &'static str| {
    Line::from(vec![
      Span::styled(" ✓ ", Style::default().fg(Color::Green)),
      Span::styled(text, Style::default().fg(colors.fg)),
    ])
  };

  let mut actions = key_hint("<i>", " install app   ", colors);
  actions.extend(key_hint("<m>", " maybe later", colors));

  let text = vec![
    Line::from(Span::styled(
      "Use like a native app",
      Style::default().fg(colors.dim),
    )),
    benefit("Works offline - no internet needed"),
    benefit("Quick access from home screen"),
    benefit("Faster than browser version"),
    Line::from(""),
    Line::from(actions),
  ];

  let paragraph = Paragraph::new(text).block(block).style(colors.base());
  frame.render_widget(paragraph, overlay);
}

/// One-line connectivity indicator across the top of the content area
pub fn draw_offline_indicator(
  frame: &mut Frame,
  area: Rect,
  colors: &Palette,
  message: &str,
  online: bool,
) {
  let width = message.chars().count() as u16 + 4;
  let overlay = top_center(area, width, 1);
  frame.render_widget(Clear, overlay);

  let bg = if online { Color::Green } else { Color::Red };
  let paragraph = Paragraph::new(Line::from(Span::styled(
    format!("  {}  ", message),
    Style::default().fg(Color::White).bg(bg).bold(),
  )))
  .style(colors.base());
  frame.render_widget(paragraph, overlay);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bottom_right_clamps_to_area() {
    let area = Rect::new(0, 1, 30, 5);
    assert_eq!(bottom_right(area, 48, 6), Rect::new(0, 1, 30, 5));
    assert_eq!(bottom_right(Rect::new(0, 0, 100, 40), 48, 6), Rect::new(52, 34, 48, 6));
  }

  #[test]
  fn test_top_center() {
    assert_eq!(top_center(Rect::new(0, 1, 100, 40), 20, 1), Rect::new(40, 1, 20, 1));
  }
}
