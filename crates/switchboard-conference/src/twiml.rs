//! Call-control markup (TwiML) returned to the telephony backend.

use crate::error::ConferenceError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// Conference events the backend reports to the status callback.
pub const STATUS_CALLBACK_EVENTS: &str = "start end join leave";

/// A `<Response>` document under construction. Elements opened with
/// [`Document::open`] are closed in reverse order by [`Document::finish`].
struct Document {
    writer: Writer<Vec<u8>>,
    open: Vec<&'static str>,
}

impl Document {
    fn new() -> Result<Self, ConferenceError> {
        let mut doc = Self {
            writer: Writer::new(Vec::new()),
            open: Vec::new(),
        };
        doc.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        doc.open("Response", &[])?;
        Ok(doc)
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), ConferenceError> {
        self.writer
            .write_event(event)
            .map_err(|e| ConferenceError::Markup(e.to_string()))
    }

    fn open(
        &mut self,
        tag: &'static str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, ConferenceError> {
        self.write(Event::Start(
            BytesStart::new(tag).with_attributes(attrs.iter().copied()),
        ))?;
        self.open.push(tag);
        Ok(self)
    }

    fn text(
        &mut self,
        tag: &str,
        attrs: &[(&str, &str)],
        text: &str,
    ) -> Result<&mut Self, ConferenceError> {
        self.write(Event::Start(
            BytesStart::new(tag).with_attributes(attrs.iter().copied()),
        ))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.write(Event::End(BytesEnd::new(tag)))?;
        Ok(self)
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<&mut Self, ConferenceError> {
        self.write(Event::Empty(
            BytesStart::new(tag).with_attributes(attrs.iter().copied()),
        ))?;
        Ok(self)
    }

    fn close(&mut self) -> Result<&mut Self, ConferenceError> {
        if let Some(tag) = self.open.pop() {
            self.write(Event::End(BytesEnd::new(tag)))?;
        }
        Ok(self)
    }

    fn finish(mut self) -> Result<String, ConferenceError> {
        while !self.open.is_empty() {
            self.close()?;
        }
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| ConferenceError::Markup(e.to_string()))
    }
}

fn conference_attrs<'a>(
    status_callback_url: Option<&'a str>,
    participant_label: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut attrs = Vec::new();
    if let Some(url) = status_callback_url {
        attrs.push(("statusCallback", url));
        attrs.push(("statusCallbackEvent", STATUS_CALLBACK_EVENTS));
    }
    if let Some(label) = participant_label {
        attrs.push(("participantLabel", label));
    }
    attrs
}

/// Markup for an outbound leg: dial straight into the named conference.
pub fn conference_join(
    conference_name: &str,
    status_callback_url: Option<&str>,
    participant_label: Option<&str>,
) -> Result<String, ConferenceError> {
    let mut doc = Document::new()?;
    doc.open("Dial", &[])?.text(
        "Conference",
        &conference_attrs(status_callback_url, participant_label),
        conference_name,
    )?;
    doc.finish()
}

/// Markup for a fresh inbound call: collect an optional key press, then
/// continue to `accept_url` whether or not one arrived.
pub fn incoming_call(accept_url: &str, greeting: &str) -> Result<String, ConferenceError> {
    let mut doc = Document::new()?;
    doc.open(
        "Gather",
        &[
            ("numDigits", "1"),
            ("timeout", "2"),
            ("action", accept_url),
            ("actionOnEmptyResult", "true"),
        ],
    )?
    .text("Say", &[], greeting)?
    .close()?
    .text("Redirect", &[], accept_url)?;
    doc.finish()
}

/// Inputs for [`accept_call`].
#[derive(Debug, Clone)]
pub struct AcceptCall<'a> {
    pub stream_url: &'a str,
    pub conference_name: &'a str,
    pub caller: &'a str,
    pub call_sid: &'a str,
    pub status_callback_url: Option<&'a str>,
}

/// Markup for an accepted call: fork the caller's audio to the media stream
/// endpoint and put the caller into their own conference.
pub fn accept_call(call: &AcceptCall<'_>) -> Result<String, ConferenceError> {
    let mut doc = Document::new()?;
    doc.open("Connect", &[])?
        .open("Stream", &[("url", call.stream_url)])?
        .empty(
            "Parameter",
            &[("name", "conferenceName"), ("value", call.conference_name)],
        )?
        .empty("Parameter", &[("name", "caller"), ("value", call.caller)])?
        .empty("Parameter", &[("name", "callSid"), ("value", call.call_sid)])?
        .close()?
        .close()?;

    let mut attrs = conference_attrs(call.status_callback_url, Some("caller"));
    attrs.push(("startConferenceOnEnter", "true"));
    attrs.push(("endConferenceOnExit", "false"));
    doc.open("Dial", &[])?
        .text("Conference", &attrs, call.conference_name)?;
    doc.finish()
}
