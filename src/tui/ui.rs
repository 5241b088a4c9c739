use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::app::App;
use crate::ranking::RankingRow;

/// Cells used for a full-width metric bar.
const BAR_WIDTH: usize = 24;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Ranking list
            Constraint::Length(2), // Status / key hints
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_ranking(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);

    if app.import_input_active {
        render_import_input(frame, app);
    }

    if app.show_help {
        render_help(frame);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let title = format!(" Social Insight [{}] ", app.sort.label());
    let pending = app.scheduler.pending_count();
    let stats = format!(
        " {} ranked | page {}/{} | {} pending refresh",
        app.ranking.total_rows,
        app.ranking.page,
        app.ranking.total_pages().max(1),
        pending,
    );

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let paragraph = Paragraph::new(stats).style(Style::default().fg(Color::White));
    frame.render_widget(paragraph, inner);
}

fn render_ranking(frame: &mut Frame, app: &App, area: Rect) {
    if app.ranking.rows.is_empty() {
        let empty = Paragraph::new("No items yet. Press 'a' to import a feed, '?' for help.")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .ranking
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let rank = (app.ranking.page - 1) * app.ranking.per_page + i + 1;
            let mut lines = vec![title_line(rank, row)];
            if app.config.enable_social {
                lines.push(social_bar_line(row));
            }
            if app.config.enable_analytics || app.config.enable_comments {
                lines.push(secondary_line(app, row));
            }
            ListItem::new(Text::from(lines))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(Style::default().bg(Color::Rgb(40, 40, 40)));

    let mut state = ListState::default();
    state.select(Some(app.selected_index));
    frame.render_stateful_widget(list, area, &mut state);
}

fn title_line(rank: usize, row: &RankingRow) -> Line<'static> {
    let date = row
        .published_at
        .map(|dt| dt.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| "undated".to_string());

    Line::from(vec![
        Span::styled(
            format!("{:>2}. ", rank),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            row.title.clone(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("  {date}"), Style::default().fg(Color::DarkGray)),
    ])
}

/// The social bar: overall width tracks the window maximum, segments split
/// the row's own total between facebook, twitter and everything else.
fn social_bar_line(row: &RankingRow) -> Line<'static> {
    let filled = BAR_WIDTH * row.total_pct_of_max as usize / 100;
    let facebook = filled * row.facebook_pct as usize / 100;
    let twitter = filled * row.twitter_pct as usize / 100;
    let other = filled.saturating_sub(facebook + twitter);

    let mut spans = vec![
        Span::raw("    "),
        Span::styled("█".repeat(facebook), Style::default().fg(Color::Blue)),
        Span::styled("█".repeat(twitter), Style::default().fg(Color::Cyan)),
        Span::styled("█".repeat(other), Style::default().fg(Color::DarkGray)),
        Span::raw(" ".repeat(BAR_WIDTH - filled)),
        Span::styled(
            format!(" {} shares", format_count(row.total)),
            Style::default().fg(Color::White),
        ),
    ];

    if row.total > 0 {
        spans.push(Span::styled(
            format!(
                "  fb {}% ({}) / tw {}% ({}) / other {}%",
                row.facebook_pct,
                format_count(row.facebook),
                row.twitter_pct,
                format_count(row.twitter),
                row.other_pct
            ),
            Style::default().fg(Color::DarkGray),
        ));
    }

    Line::from(spans)
}

fn secondary_line(app: &App, row: &RankingRow) -> Line<'static> {
    let mut spans = vec![Span::raw("    ")];

    if app.config.enable_analytics {
        let filled = BAR_WIDTH / 2 * row.views_pct_of_max as usize / 100;
        spans.push(Span::styled("views    ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(
            "▆".repeat(filled),
            Style::default().fg(Color::Green),
        ));
        spans.push(Span::styled(
            format!(" {}  ", format_count(row.views)),
            Style::default().fg(Color::White),
        ));
    }

    if app.config.enable_comments {
        let filled = BAR_WIDTH / 2 * row.comments_pct_of_max as usize / 100;
        spans.push(Span::styled("comments ", Style::default().fg(Color::DarkGray)));
        spans.push(Span::styled(
            "▆".repeat(filled),
            Style::default().fg(Color::Yellow),
        ));
        spans.push(Span::styled(
            format!(" {}", format_count(row.comments)),
            Style::default().fg(Color::White),
        ));
    }

    Line::from(spans)
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let range = if app.range_months == 0 {
        "Showing most popular items of all time".to_string()
    } else {
        format!(
            "Showing most popular items published within {} months",
            app.range_months
        )
    };
    let left = app.status_message.clone().unwrap_or(range);
    frame.render_widget(
        Paragraph::new(left).style(Style::default().fg(Color::Gray)),
        chunks[0],
    );

    let hints = "q quit | j/k move | n/p page | s sort | d range | r refresh | B backfill | a import | o open | ? help";
    frame.render_widget(
        Paragraph::new(hints).style(Style::default().fg(Color::DarkGray)),
        chunks[1],
    );
}

fn render_import_input(frame: &mut Frame, app: &App) {
    let area = centered_rect(60, 3, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(" Import feed (site or feed URL) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let input = Paragraph::new(format!("{}▏", app.import_input))
        .style(Style::default().fg(Color::White));
    frame.render_widget(input, inner);
}

fn render_help(frame: &mut Frame) {
    let area = centered_rect(52, 15, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from("  j/k or ↑/↓   move selection"),
        Line::from("  n/p or ←/→   next / previous page"),
        Line::from("  s            cycle sort column"),
        Line::from("  d            cycle date range"),
        Line::from("  r            refresh selected item now"),
        Line::from("  B            backfill metrics for all items"),
        Line::from("  a            import items from a feed"),
        Line::from("  o or Enter   open item in browser"),
        Line::from("  q or Esc     quit"),
        Line::from(""),
        Line::from("  Bars are relative to the best item in view;"),
        Line::from("  segment colors split shares by provider."),
    ];

    let help = Paragraph::new(Text::from(lines))
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(" Help ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        );
    frame.render_widget(help, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn format_count(n: i64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_format_with_thousands_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1234), "1,234");
        assert_eq!(format_count(1234567), "1,234,567");
    }
}
