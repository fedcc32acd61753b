use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;
use writracker::{session::Outcome, Phase};

use crate::{stats_line, App, InputMode};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

const KEY_HELP: &str = "n/→ next  p/← prev  g goto  o OK  e error tag  c clear  space play  \
r reset  t rotate  a add tag  h help  x end  q quit";

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let bold_style = Style::default().add_modifier(Modifier::BOLD);
        let dim_style = Style::default().add_modifier(Modifier::DIM);
        let green_bold_style = Style::default().patch(bold_style).fg(Color::Green);
        let red_bold_style = Style::default().patch(bold_style).fg(Color::Red);
        let yellow_style = Style::default().fg(Color::Yellow);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(3), // status
                Constraint::Min(3),    // target
                Constraint::Length(1), // outcome
                Constraint::Length(1), // stats
                Constraint::Length(1), // message / input
                Constraint::Length(2), // key help
            ])
            .split(area);

        let phase = self.controller.phase();
        let state = self.controller.state();

        let status = match state {
            Some(state) => {
                let id = state
                    .current_target()
                    .map_or_else(|| "-".to_string(), |t| t.id.clone());
                format!(
                    "target {id}  |  {phase}  |  rotation {}  |  samples {}  strokes {}{}",
                    state.rotation(),
                    state.recorded_samples(),
                    state.pen().strokes.len(),
                    if state.skip_ok() { "  |  retrying errors" } else { "" },
                )
            }
            None => phase.to_string(),
        };
        Paragraph::new(Span::styled(status, dim_style))
            .block(Block::default().borders(Borders::BOTTOM).title("writracker"))
            .alignment(Alignment::Left)
            .render(chunks[0], buf);

        let (target_text, target_style) = match (phase, state.and_then(|s| s.current_target())) {
            (Phase::SessionEnded, _) => ("Session ended".to_string(), dim_style),
            (Phase::Exhausted, _) | (_, None) => ("No target".to_string(), dim_style),
            (Phase::Recording, Some(t)) => (t.value.clone(), bold_style.fg(Color::Cyan)),
            (_, Some(t)) => (t.value.clone(), bold_style),
        };
        // vertically center single-line targets; long ones wrap from the top
        let target_area = chunks[1];
        let lines = (target_text.width() as u16 / target_area.width.max(1)) + 1;
        let pad = target_area.height.saturating_sub(lines) / 2;
        let centered = Rect {
            y: target_area.y + pad,
            height: target_area.height - pad,
            ..target_area
        };
        Paragraph::new(Span::styled(target_text, target_style))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(centered, buf);

        let outcome = match state.and_then(|s| s.pending_outcome()) {
            Some(Outcome::Ok) => Span::styled("outcome: OK", green_bold_style),
            Some(Outcome::Error(tag)) => Span::styled(format!("outcome: {tag}"), red_bold_style),
            None if phase == Phase::Recording => Span::styled("outcome: -", dim_style),
            None => Span::raw(""),
        };
        Paragraph::new(outcome)
            .alignment(Alignment::Center)
            .render(chunks[2], buf);

        let stats = self
            .controller
            .stats()
            .or(self.final_stats)
            .map(|s| stats_line(&s))
            .unwrap_or_default();
        Paragraph::new(Span::styled(stats, dim_style))
            .alignment(Alignment::Center)
            .render(chunks[3], buf);

        let prompt = match &self.input {
            InputMode::Goto(id) => Line::from(vec![
                Span::styled("go to target id: ", yellow_style),
                Span::styled(id.as_str(), bold_style),
            ]),
            InputMode::NewTag(tag) => Line::from(vec![
                Span::styled("new error tag: ", yellow_style),
                Span::styled(tag.as_str(), bold_style),
            ]),
            InputMode::Command => {
                Line::from(Span::styled(self.message.clone().unwrap_or_default(), yellow_style))
            }
        };
        Paragraph::new(prompt)
            .alignment(Alignment::Center)
            .render(chunks[4], buf);

        Paragraph::new(Span::styled(KEY_HELP, dim_style.add_modifier(Modifier::ITALIC)))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .render(chunks[5], buf);
    }
}
