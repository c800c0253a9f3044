// Colored terminal output for dry-run replies, cycle summaries, and the
// reply table overview.

use colored::Colorize;

use super::{one_line, truncate_chars};
use crate::pipeline::poll::CycleReport;
use crate::reply::table::{ReplyBook, DEFAULT_KEY};
use crate::reply::{ObservedPost, ReplyDecision};

/// Show a reply that would have been posted.
pub fn display_dry_run(post: &ObservedPost, decision: &ReplyDecision) {
    println!(
        "{} Would reply to {}: {}",
        "[DEV]".yellow().bold(),
        post.uri.dimmed(),
        truncate_chars(&one_line(&decision.text), 120),
    );
    if let Some(ref link) = decision.link_url {
        println!("      with link card for {}", link.cyan());
    }
}

/// One-line summary after each polling cycle.
pub fn display_cycle_summary(report: &CycleReport, dry_run: bool) {
    let replied = if dry_run {
        format!("{} dry-run", report.dry_run_replies).yellow()
    } else {
        format!("{} sent", report.replies_sent).green()
    };

    let mut line = format!(
        "Cycle: {} accounts, {} posts, {}, {} skipped",
        report.accounts_checked,
        report.posts_seen,
        replied,
        report.skipped_total(),
    );
    if report.accounts_failed > 0 {
        line.push_str(&format!(", {}", format!("{} fetch failures", report.accounts_failed).red()));
    }
    if report.publish_failures > 0 {
        line.push_str(&format!(", {}", format!("{} publish failures", report.publish_failures).red()));
    }
    println!("{line}");

    for (reason, count) in &report.skipped {
        println!("  {} {}", format!("{count:>3}").dimmed(), reason.label().dimmed());
    }
}

/// Overview of the replies file for `rejoinder check`.
pub fn display_reply_book(book: &ReplyBook, warnings: &[String]) {
    println!("\n{}", format!("=== Watching {} accounts ===", book.watch.len()).bold());
    for handle in book.watch.iter() {
        let source = if book.table.has_dedicated(handle) {
            "dedicated".green()
        } else {
            DEFAULT_KEY.dimmed()
        };
        println!(
            "  @{:<36} {:>3} replies ({})",
            handle,
            book.table.templates_for(handle).len(),
            source,
        );
    }

    println!("\n{}", "=== Reply lists ===".bold());
    for key in book.table.keys() {
        let templates = book.table.templates_for(key);
        let linked = templates.iter().filter(|t| t.link.is_some()).count();
        println!(
            "  {:<37} {:>3} replies, {} with explicit links",
            key, templates.len(), linked
        );
    }

    if warnings.is_empty() {
        println!("\n{}", "No problems found.".green());
    } else {
        println!();
        for warning in warnings {
            println!("  {} {}", "!".yellow().bold(), warning);
        }
    }
}

/// Engine verdict for one post, for `rejoinder preview`.
pub fn display_preview(post: &ObservedPost, decision: &ReplyDecision) {
    println!("{}", post.uri.bold());
    if decision.should_reply {
        println!("  {} {}", "reply:".green(), one_line(&decision.text));
        if let Some(ref link) = decision.link_url {
            println!("  {} {}", "card: ".cyan(), link);
        }
    } else {
        let reason = decision.skip.map(|r| r.label()).unwrap_or("no reply");
        println!("  {} {}", "skip: ".dimmed(), reason);
    }
}
