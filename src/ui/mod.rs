mod components;
mod renderfns;

use crate::app::{App, AssetState};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use renderfns::{palette, source_color, status_color, truncate, Palette};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &App) {
  let colors = palette(app.theme());
  frame.render_widget(Block::default().style(colors.base()), frame.area());

  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Asset list
      Constraint::Length(1), // Status bar
    ])
    .split(frame.area());

  let version = app
    .controlled_by()
    .map(|v| v.to_string())
    .unwrap_or_else(|| "not controlled".to_string());
  renderfns::draw_header(frame, chunks[0], &colors, app.origin(), &version, app.is_online());

  draw_asset_list(frame, chunks[1], &colors, app);
  renderfns::draw_footer(frame, chunks[2], &colors, app.status());

  let overlays = app.overlays();
  if let Some(message) = &overlays.offline {
    components::draw_offline_indicator(frame, chunks[1], &colors, message, app.is_online());
  }
  if overlays.install_prompt {
    components::draw_install_prompt(frame, chunks[1], &colors);
  }
  if let Some(version) = &overlays.update_banner {
    components::draw_update_banner(frame, chunks[1], &colors, version.as_str());
  }
}

fn draw_asset_list(frame: &mut Frame, area: Rect, colors: &Palette, app: &App) {
  let assets = app.assets();
  let block = Block::default()
    .title(format!(" Assets ({}) ", assets.len()))
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(colors.accent));

  if assets.is_empty() {
    let paragraph = Paragraph::new("No assets in this deployment.")
      .block(block)
      .style(Style::default().fg(colors.dim));
    frame.render_widget(paragraph, area);
    return;
  }

  let items: Vec<ListItem> = assets
    .iter()
    .map(|row| {
      let kind = if row.core { "core" } else { "lazy" };
      let mut spans = vec![
        Span::styled(format!("{:<5}", kind), Style::default().fg(colors.dim)),
        Span::raw(" "),
        Span::styled(
          format!("{:<40}", truncate(&row.path, 40)),
          Style::default().fg(colors.fg),
        ),
        Span::raw(" "),
      ];
      match &row.last {
        None => {}
        Some(AssetState::Loading) => {
          spans.push(Span::styled("loading...", Style::default().fg(colors.dim)))
        }
        Some(AssetState::Done(report)) => {
          spans.push(Span::styled(
            format!("{:<4}", report.status),
            Style::default().fg(status_color(report.status)),
          ));
          spans.push(Span::styled(
            format!("{:<12}", report.source),
            Style::default().fg(source_color(report.source)),
          ));
          spans.push(Span::styled(
            format!("{} B", report.bytes),
            Style::default().fg(colors.dim),
          ));
        }
        Some(AssetState::Failed(error)) => spans.push(Span::styled(
          truncate(error, 50),
          Style::default().fg(Color::Red),
        )),
      }
      ListItem::new(Line::from(spans))
    })
    .collect();

  let list = List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(colors.highlight)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ");

  let mut state = ListState::default();
  state.select(Some(app.selected()));
  frame.render_stateful_widget(list, area, &mut state);
}
