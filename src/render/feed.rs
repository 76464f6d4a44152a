//! RSS 2.0 document writer.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Error, Result};

/// `pubDate` used when a message date could not be parsed.
pub const UNKNOWN_PUB_DATE: &str = "Thu, 01 Jan 1970 00:00:00 +0000";

/// Channel-level metadata.
#[derive(Debug, Clone)]
pub struct Channel<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub description: &'a str,
    pub last_build: DateTime<Utc>,
}

/// One `<item>`. Values are plain text; escaping happens while writing.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Permalink of a message: `<base>/email/<uid>`, without a doubled slash.
pub fn item_link(public_url: &str, uid: &str) -> String {
    format!("{}/email/{}", public_url.trim_end_matches('/'), uid)
}

pub fn pub_date(date: Option<DateTime<Utc>>) -> String {
    match date {
        Some(d) => d.to_rfc2822(),
        None => UNKNOWN_PUB_DATE.to_string(),
    }
}

/// Serialize a complete RSS document.
pub fn write_rss(channel: &Channel<'_>, items: &[Item]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    emit(&mut writer, Event::Start(rss))?;
    emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", channel.title)?;
    text_element(&mut writer, "link", channel.link)?;
    text_element(&mut writer, "description", channel.description)?;
    text_element(&mut writer, "lastBuildDate", &channel.last_build.to_rfc2822())?;

    for item in items {
        emit(&mut writer, Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &item.title)?;
        text_element(&mut writer, "link", &item.link)?;
        text_element(&mut writer, "guid", &item.link)?;
        text_element(&mut writer, "pubDate", &item.pub_date)?;
        text_element(&mut writer, "description", &item.description)?;
        emit(&mut writer, Event::End(BytesEnd::new("item")))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    String::from_utf8(writer.into_inner()).map_err(|e| Error::Feed(e.to_string()))
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::Feed(e.to_string()))
}
