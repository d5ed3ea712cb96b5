use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::escape::escape_xml;
use super::magnet::MagnetBuilder;
use crate::record::FeedItem;

/// RFC 822 date, always rendered in GMT.
const RSS_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Channel metadata for a rendered feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub title: String,
    pub link: String,
    pub description: String,
}

/// Render items as an RSS 2.0 document.
///
/// Items are written in the order given. Each item carries its identity as
/// a non-permalink guid and a magnet enclosure, which is what
/// [`read_feed_items`](super::read_feed_items) re-detects on the next run.
pub fn render_feed(
    channel: &ChannelInfo,
    items: &[FeedItem],
    magnets: &MagnetBuilder,
    built_at: DateTime<Utc>,
) -> String {
    let mut out = String::with_capacity(512 + items.len() * 512);

    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<rss version=\"2.0\">\n<channel>\n");
    let _ = writeln!(out, "<title>{}</title>", escape_xml(&channel.title));
    let _ = writeln!(out, "<link>{}</link>", escape_xml(&channel.link));
    let _ = writeln!(
        out,
        "<description>{}</description>",
        escape_xml(&channel.description)
    );
    let _ = writeln!(
        out,
        "<lastBuildDate>{}</lastBuildDate>",
        built_at.format(RSS_DATE_FORMAT)
    );

    for item in items {
        let magnet = magnets.build(&item.identity);
        out.push_str("<item>\n");
        let _ = writeln!(out, "<title>{}</title>", escape_xml(&item.title));
        let _ = writeln!(out, "<link>{}</link>", escape_xml(&item.link));
        let _ = writeln!(
            out,
            "<guid isPermaLink=\"false\">{}</guid>",
            item.identity
        );
        let _ = writeln!(
            out,
            "<pubDate>{}</pubDate>",
            item.publish_time.format(RSS_DATE_FORMAT)
        );
        let _ = writeln!(
            out,
            "<enclosure url=\"{}\" length=\"0\" type=\"application/x-bittorrent\"/>",
            escape_xml(&magnet)
        );
        out.push_str("</item>\n");
    }

    out.push_str("</channel>\n</rss>\n");
    out
}
