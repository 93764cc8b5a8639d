//! SOAP request builders and response parsers for the handful of EWS
//! operations the booking service needs.

use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

use crate::error::EwsError;
use crate::types::{Attendee, CalendarItem, ItemTime, Mailbox, ResponseType, SendMeetingInvitations};

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const TYPES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/types";
const MESSAGES_NS: &str = "http://schemas.microsoft.com/exchange/services/2006/messages";

pub const SERVER_VERSION: &str = "Exchange2013";

/// Wrap an operation body in a SOAP envelope. When `impersonate` is set the
/// request acts on behalf of that mailbox.
pub fn envelope(impersonate: Option<&str>, body: &str) -> String {
    let impersonation = impersonate
        .map(|email| {
            format!(
                "<t:ExchangeImpersonation><t:ConnectingSID>\
                 <t:PrimarySmtpAddress>{}</t:PrimarySmtpAddress>\
                 </t:ConnectingSID></t:ExchangeImpersonation>",
                xml_escape(email)
            )
        })
        .unwrap_or_default();

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <soap:Envelope xmlns:soap=\"{SOAP_NS}\" xmlns:t=\"{TYPES_NS}\" xmlns:m=\"{MESSAGES_NS}\">\
         <soap:Header><t:RequestServerVersion Version=\"{SERVER_VERSION}\"/>{impersonation}</soap:Header>\
         <soap:Body>{body}</soap:Body>\
         </soap:Envelope>"
    )
}

pub fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Ids of calendar items in `mailbox` intersecting `[start, end)`.
pub fn find_item_request(mailbox: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "<m:FindItem Traversal=\"Shallow\">\
         <m:ItemShape><t:BaseShape>IdOnly</t:BaseShape></m:ItemShape>\
         <m:CalendarView StartDate=\"{}\" EndDate=\"{}\"/>\
         <m:ParentFolderIds><t:DistinguishedFolderId Id=\"calendar\">\
         <t:Mailbox><t:EmailAddress>{}</t:EmailAddress></t:Mailbox>\
         </t:DistinguishedFolderId></m:ParentFolderIds>\
         </m:FindItem>",
        format_time(start),
        format_time(end),
        xml_escape(mailbox)
    )
}

/// Full items, including the attendee lists FindItem never returns.
pub fn get_item_request<S: AsRef<str>>(ids: &[S]) -> String {
    let item_ids: String = ids
        .iter()
        .map(|id| format!("<t:ItemId Id=\"{}\"/>", xml_escape(id.as_ref())))
        .collect();
    format!(
        "<m:GetItem>\
         <m:ItemShape><t:BaseShape>Default</t:BaseShape>\
         <t:BodyType>Text</t:BodyType>\
         <t:AdditionalProperties>\
         <t:FieldURI FieldURI=\"item:Body\"/>\
         <t:FieldURI FieldURI=\"calendar:IsAllDayEvent\"/>\
         <t:FieldURI FieldURI=\"calendar:Organizer\"/>\
         <t:FieldURI FieldURI=\"calendar:RequiredAttendees\"/>\
         <t:FieldURI FieldURI=\"calendar:Resources\"/>\
         </t:AdditionalProperties></m:ItemShape>\
         <m:ItemIds>{item_ids}</m:ItemIds>\
         </m:GetItem>"
    )
}

fn attendees_xml(tag: &str, attendees: Option<&Vec<Attendee>>) -> String {
    match attendees {
        Some(list) if !list.is_empty() => {
            let inner: String = list
                .iter()
                .map(|a| {
                    format!(
                        "<t:Attendee><t:Mailbox><t:EmailAddress>{}</t:EmailAddress></t:Mailbox></t:Attendee>",
                        xml_escape(a.email())
                    )
                })
                .collect();
            format!("<t:{tag}>{inner}</t:{tag}>")
        }
        _ => String::new(),
    }
}

/// Create a meeting in the caller's calendar. The organizer is always the
/// mailbox the request runs as, so `item.organizer` is not sent.
pub fn create_item_request(item: &CalendarItem, send: SendMeetingInvitations) -> String {
    let mut fields = String::new();
    if let Some(subject) = &item.subject {
        fields.push_str(&format!("<t:Subject>{}</t:Subject>", xml_escape(subject)));
    }
    if let Some(body) = &item.body {
        fields.push_str(&format!(
            "<t:Body BodyType=\"Text\">{}</t:Body>",
            xml_escape(body)
        ));
    }
    if let Some(start) = item.start.as_ref().and_then(ItemTime::to_ews) {
        fields.push_str(&format!("<t:Start>{start}</t:Start>"));
    }
    if let Some(end) = item.end.as_ref().and_then(ItemTime::to_ews) {
        fields.push_str(&format!("<t:End>{end}</t:End>"));
    }
    if let Some(location) = &item.location {
        fields.push_str(&format!("<t:Location>{}</t:Location>", xml_escape(location)));
    }
    fields.push_str(&attendees_xml("RequiredAttendees", item.required_attendees.as_ref()));
    fields.push_str(&attendees_xml("Resources", item.resources.as_ref()));

    format!(
        "<m:CreateItem SendMeetingInvitations=\"{}\">\
         <m:SavedItemFolderId><t:DistinguishedFolderId Id=\"calendar\"/></m:SavedItemFolderId>\
         <m:Items><t:CalendarItem>{fields}</t:CalendarItem></m:Items>\
         </m:CreateItem>",
        send.as_str()
    )
}

/// Move an item to Deleted Items and send cancellations to every attendee.
pub fn delete_item_request(id: &str, change_key: Option<&str>) -> String {
    let change_key = change_key
        .map(|ck| format!(" ChangeKey=\"{}\"", xml_escape(ck)))
        .unwrap_or_default();
    format!(
        "<m:DeleteItem DeleteType=\"MoveToDeletedItems\" \
         SendMeetingCancellations=\"SendToAllAndSaveCopy\">\
         <m:ItemIds><t:ItemId Id=\"{}\"{change_key}/></m:ItemIds>\
         </m:DeleteItem>",
        xml_escape(id)
    )
}

fn parse(xml: &str) -> Result<Document<'_>, EwsError> {
    Document::parse(xml).map_err(|e| EwsError::InvalidResponse(format!("XML parse error: {}", e)))
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a, 'i: 'a>(node: Node<'a, 'i>, name: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name).and_then(|n| n.text()).map(|t| t.to_string())
}

fn error_from_message(message: Node<'_, '_>) -> EwsError {
    let code = child_text(message, "ResponseCode").unwrap_or_default();
    let text = child_text(message, "MessageText").unwrap_or_default();
    error_from_code(code, text, message)
}

fn error_from_code(code: String, text: String, context: Node<'_, '_>) -> EwsError {
    match code.as_str() {
        "ErrorItemNotFound" | "ErrorInvalidIdMalformed" => EwsError::ItemNotFound(text),
        "ErrorServerBusy" => {
            let back_off_ms = context
                .descendants()
                .find(|n| n.is_element() && n.attribute("Name") == Some("BackOffMilliseconds"))
                .and_then(|n| n.text())
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0);
            EwsError::ServerBusy { back_off_ms }
        }
        _ => EwsError::ResponseError {
            code,
            message: text,
        },
    }
}

fn check_fault(doc: &Document<'_>) -> Result<(), EwsError> {
    let Some(fault) = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "Fault" && n.tag_name().namespace() == Some(SOAP_NS))
    else {
        return Ok(());
    };
    let text = child_text(fault, "faultstring").unwrap_or_default();
    let code = fault
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "ResponseCode")
        .and_then(|n| n.text())
        .map(|t| t.to_string())
        .unwrap_or_else(|| "SoapFault".to_string());
    Err(error_from_code(code, text, fault))
}

/// The error carried by a SOAP fault body, if `xml` is one.
pub fn fault_error(xml: &str) -> Option<EwsError> {
    let doc = Document::parse(xml).ok()?;
    check_fault(&doc).err()
}

/// Every `*ResponseMessage` element under `ResponseMessages`.
fn response_messages<'a, 'i>(doc: &'a Document<'i>) -> Result<Vec<Node<'a, 'i>>, EwsError> {
    check_fault(doc)?;
    let container = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "ResponseMessages")
        .ok_or_else(|| EwsError::InvalidResponse("missing ResponseMessages".into()))?;
    Ok(container
        .children()
        .filter(|n| n.is_element() && n.tag_name().name().ends_with("ResponseMessage"))
        .collect())
}

fn is_error(message: Node<'_, '_>) -> bool {
    message.attribute("ResponseClass") == Some("Error")
}

/// Item ids (with change keys) from a FindItem response.
pub fn parse_find_item_response(xml: &str) -> Result<Vec<(String, Option<String>)>, EwsError> {
    let doc = parse(xml)?;
    let mut ids = Vec::new();
    for message in response_messages(&doc)? {
        if is_error(message) {
            return Err(error_from_message(message));
        }
        for item_id in message
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "ItemId")
        {
            if let Some(id) = item_id.attribute("Id") {
                ids.push((id.to_string(), item_id.attribute("ChangeKey").map(str::to_string)));
            }
        }
    }
    Ok(ids)
}

/// Calendar items from a GetItem or CreateItem response.
///
/// With `skip_missing`, items deleted between FindItem and GetItem are
/// dropped instead of failing the whole batch.
pub fn parse_items_response(xml: &str, skip_missing: bool) -> Result<Vec<CalendarItem>, EwsError> {
    let doc = parse(xml)?;
    let mut items = Vec::new();
    for message in response_messages(&doc)? {
        if is_error(message) {
            let err = error_from_message(message);
            if skip_missing && err.is_not_found() {
                tracing::debug!("Skipping item that vanished during view: {}", err);
                continue;
            }
            return Err(err);
        }
        let Some(container) = child(message, "Items") else {
            continue;
        };
        items.extend(
            container
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "CalendarItem")
                .map(parse_calendar_item),
        );
    }
    Ok(items)
}

/// Success or the first error from a DeleteItem response.
pub fn parse_delete_response(xml: &str) -> Result<(), EwsError> {
    let doc = parse(xml)?;
    match response_messages(&doc)?.into_iter().find(|m| is_error(*m)) {
        Some(message) => Err(error_from_message(message)),
        None => Ok(()),
    }
}

fn parse_mailbox(node: Node<'_, '_>) -> Option<Mailbox> {
    let mailbox = child(node, "Mailbox")?;
    Some(Mailbox {
        email_address: child_text(mailbox, "EmailAddress")?,
        name: child_text(mailbox, "Name"),
    })
}

fn parse_attendees(node: Node<'_, '_>, list: &str) -> Option<Vec<Attendee>> {
    let list = child(node, list)?;
    Some(
        children(list, "Attendee")
            .filter_map(|a| {
                Some(Attendee {
                    mailbox: parse_mailbox(a)?,
                    response_type: child_text(a, "ResponseType")
                        .map(|r| ResponseType::parse(&r))
                        .unwrap_or_default(),
                })
            })
            .collect(),
    )
}

fn parse_calendar_item(node: Node<'_, '_>) -> CalendarItem {
    let item_id = child(node, "ItemId");
    let all_day = child_text(node, "IsAllDayEvent").as_deref() == Some("true");
    CalendarItem {
        id: item_id.and_then(|n| n.attribute("Id")).map(str::to_string),
        change_key: item_id.and_then(|n| n.attribute("ChangeKey")).map(str::to_string),
        subject: child_text(node, "Subject"),
        start: child_text(node, "Start").map(|t| ItemTime::parse(&t, all_day)),
        end: child_text(node, "End").map(|t| ItemTime::parse(&t, all_day)),
        location: child_text(node, "Location"),
        body: child_text(node, "Body"),
        organizer: child(node, "Organizer").and_then(parse_mailbox),
        required_attendees: parse_attendees(node, "RequiredAttendees"),
        resources: parse_attendees(node, "Resources"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use chrono::TimeZone;

    fn wrap(body: &str) -> String {
        format!(
            "<s:Envelope xmlns:s=\"{SOAP_NS}\"><s:Body>{body}</s:Body></s:Envelope>"
        )
    }

    #[test]
    fn test_envelope_carries_impersonation() {
        let xml = envelope(Some("room&1@example.com"), "<m:GetItem/>");
        assert!(xml.contains("Exchange2013"));
        assert!(xml.contains("<t:PrimarySmtpAddress>room&amp;1@example.com</t:PrimarySmtpAddress>"));
        assert!(!envelope(None, "").contains("ExchangeImpersonation"));
    }

    #[test]
    fn test_create_item_request_fields() {
        let item = CalendarItem {
            subject: Some("Retro <Q1>".into()),
            start: Some(ItemTime::DateTime(Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap())),
            end: Some(ItemTime::DateTime(Utc.with_ymd_and_hms(2024, 2, 1, 11, 0, 0).unwrap())),
            required_attendees: Some(vec![Attendee::organizer("alice@example.com")]),
            ..Default::default()
        };
        let xml = create_item_request(&item, SendMeetingInvitations::SendOnlyToAll);
        assert!(xml.contains("SendMeetingInvitations=\"SendOnlyToAll\""));
        assert!(xml.contains("<t:Subject>Retro &lt;Q1&gt;</t:Subject>"));
        assert!(xml.contains("<t:Start>2024-02-01T10:00:00Z</t:Start>"));
        assert!(xml.contains("<t:EmailAddress>alice@example.com</t:EmailAddress>"));
        assert!(!xml.contains("Resources"));
    }

    #[test]
    fn test_parse_get_item_response() {
        let xml = wrap(&format!(
            "<m:GetItemResponse xmlns:m=\"{MESSAGES_NS}\" xmlns:t=\"{TYPES_NS}\">\
             <m:ResponseMessages>\
             <m:GetItemResponseMessage ResponseClass=\"Success\">\
             <m:ResponseCode>NoError</m:ResponseCode>\
             <m:Items><t:CalendarItem>\
             <t:ItemId Id=\"AAMk1\" ChangeKey=\"DwAA\"/>\
             <t:Subject>Standup</t:Subject>\
             <t:Start>2024-02-01T10:00:00Z</t:Start>\
             <t:End>2024-02-01T10:15:00Z</t:End>\
             <t:IsAllDayEvent>false</t:IsAllDayEvent>\
             <t:Location>Meeting Room #3</t:Location>\
             <t:Organizer><t:Mailbox><t:Name>Alice</t:Name>\
             <t:EmailAddress>alice@example.com</t:EmailAddress></t:Mailbox></t:Organizer>\
             <t:RequiredAttendees>\
             <t:Attendee><t:Mailbox><t:EmailAddress>alice@example.com</t:EmailAddress></t:Mailbox>\
             <t:ResponseType>Organizer</t:ResponseType></t:Attendee>\
             <t:Attendee><t:Mailbox><t:EmailAddress>room3@example.com</t:EmailAddress></t:Mailbox>\
             <t:ResponseType>Accept</t:ResponseType></t:Attendee>\
             </t:RequiredAttendees>\
             </t:CalendarItem></m:Items>\
             </m:GetItemResponseMessage>\
             </m:ResponseMessages></m:GetItemResponse>"
        ));

        let items = parse_items_response(&xml, false).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id.as_deref(), Some("AAMk1"));
        assert_eq!(item.change_key.as_deref(), Some("DwAA"));
        assert_eq!(item.subject.as_deref(), Some("Standup"));
        assert_eq!(item.organizer.as_ref().unwrap().name.as_deref(), Some("Alice"));
        let attendees = item.required_attendees.as_ref().unwrap();
        assert_eq!(attendees.len(), 2);
        assert_eq!(attendees[0].response_type, ResponseType::Organizer);
        assert_eq!(attendees[1].email(), "room3@example.com");
        assert!(item.resources.is_none());
    }

    #[test]
    fn test_parse_item_not_found() {
        let xml = wrap(&format!(
            "<m:GetItemResponse xmlns:m=\"{MESSAGES_NS}\">\
             <m:ResponseMessages>\
             <m:GetItemResponseMessage ResponseClass=\"Error\">\
             <m:MessageText>The specified object was not found in the store.</m:MessageText>\
             <m:ResponseCode>ErrorItemNotFound</m:ResponseCode>\
             </m:GetItemResponseMessage>\
             </m:ResponseMessages></m:GetItemResponse>"
        ));
        assert!(matches!(
            parse_items_response(&xml, false),
            Err(EwsError::ItemNotFound(_))
        ));
        assert!(parse_items_response(&xml, true).unwrap().is_empty());
    }

    #[test]
    fn test_parse_server_busy_fault() {
        let xml = wrap(&format!(
            "<s:Fault><faultcode>a:ErrorServerBusy</faultcode>\
             <faultstring>The server cannot service this request right now.</faultstring>\
             <detail><e:ResponseCode xmlns:e=\"{TYPES_NS}\">ErrorServerBusy</e:ResponseCode>\
             <e:MessageXml xmlns:e=\"{TYPES_NS}\">\
             <t:Value xmlns:t=\"{TYPES_NS}\" Name=\"BackOffMilliseconds\">250</t:Value>\
             </e:MessageXml></detail></s:Fault>"
        ));
        assert!(matches!(
            parse_delete_response(&xml),
            Err(EwsError::ServerBusy { back_off_ms: 250 })
        ));
    }

    #[test]
    fn test_parse_find_item_ids() {
        let xml = wrap(&format!(
            "<m:FindItemResponse xmlns:m=\"{MESSAGES_NS}\" xmlns:t=\"{TYPES_NS}\">\
             <m:ResponseMessages>\
             <m:FindItemResponseMessage ResponseClass=\"Success\">\
             <m:ResponseCode>NoError</m:ResponseCode>\
             <m:RootFolder TotalItemsInView=\"2\" IncludesLastItemInRange=\"true\"><t:Items>\
             <t:CalendarItem><t:ItemId Id=\"A\" ChangeKey=\"1\"/></t:CalendarItem>\
             <t:CalendarItem><t:ItemId Id=\"B\"/></t:CalendarItem>\
             </t:Items></m:RootFolder>\
             </m:FindItemResponseMessage>\
             </m:ResponseMessages></m:FindItemResponse>"
        ));
        let ids = parse_find_item_response(&xml).unwrap();
        assert_eq!(
            ids,
            vec![("A".to_string(), Some("1".to_string())), ("B".to_string(), None)]
        );
    }
}
