use super::Palette;
use crate::app::StatusMessage;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the status bar: the latest message, or key hints when there is none
pub fn draw_footer(frame: &mut Frame, area: Rect, colors: &Palette, status: Option<&StatusMessage>) {
  let line = match status {
    Some(StatusMessage { text, error: true }) => Line::from(vec![
      Span::styled(" error ", Style::default().fg(Color::White).bg(Color::Red).bold()),
      Span::raw(" "),
      Span::styled(text.clone(), Style::default().fg(Color::Red)),
    ]),
    Some(StatusMessage { text, .. }) => Line::from(vec![
      Span::raw(" "),
      Span::styled(text.clone(), Style::default().fg(colors.fg)),
    ]),
    None => Line::from(Span::styled(
      " j/k:nav  Enter:fetch  r:check update  t:theme  q:quit",
      Style::default().fg(colors.dim),
    )),
  };

  let paragraph = Paragraph::new(line).style(colors.bar());
  frame.render_widget(paragraph, area);
}
