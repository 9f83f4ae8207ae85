//! Tracking for DHL Express shipments.
//!
//! DHL's tracking service speaks SOAP, and one request can carry many AWB
//! numbers, so batch lookups issue a single wire call and demultiplex the
//! response per AWB. The `auth` options must carry `site_id` and `password`
//! keys (the WSSE username-token credentials for the gateway).

use std::io::Cursor;
use std::sync::Arc;

use chrono::{FixedOffset, Local, NaiveDate, NaiveTime};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use tracing::debug;

use parceltrack_core::{EventTimestamp, HistoryEntry, Shipment, classify_last_entry};

use crate::auth::AuthOptions;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BatchItem, BoxFuture, ShipmentProvider, TrackingBatch};
use crate::transport::{HttpTransport, Transport, TransportRequest};
use crate::xml::{local_name, write_text_element};

const ENDPOINT: &str = "https://wsbuat.dhl.com:8300/gbl/glDHLExpressTrack";

/// WS-Security namespace for the username-token header.
const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// The service wants a reference between 28 and 32 characters.
const MESSAGE_REFERENCE: &str = "1234567890123456789012345678";

// DHL express checkpoint codes.

const SUCCESSFUL_DELIVERY_EVENT_CODES: &[&str] = &[
    "OK", // Shipment delivered
];

const FAILED_DELIVERY_EVENT_CODES: &[&str] = &[
    "RT", // Shipment returned to origin
    "UD", // Shipment undeliverable
];

/// DHL Express tracking adapter.
pub struct Dhl {
    transport: Arc<dyn Transport>,
}

impl Dhl {
    /// Creates an adapter backed by the production HTTP transport.
    pub fn new() -> ProviderResult<Self> {
        Ok(Self {
            transport: Arc::new(HttpTransport::new()?),
        })
    }

    /// Creates an adapter over a custom transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Issues the one SOAP call covering the whole batch and pairs every
    /// requested code with its own result.
    async fn request_batch(
        &self,
        tracking_codes: &[String],
        auth: &AuthOptions,
    ) -> ProviderResult<Vec<BatchItem>> {
        let site_id = auth.require("site_id")?;
        let password = auth.require("password")?;

        let message_time = Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string();
        let envelope = request_envelope(site_id, password, tracking_codes, &message_time);

        let request = TransportRequest::post(ENDPOINT)
            .with_header("Content-Type", "text/xml; charset=utf-8")
            .with_header("SOAPAction", "glDHLExpressTrack")
            .with_body(envelope);

        debug!(count = tracking_codes.len(), "requesting DHL tracking batch");

        let body = match self.transport.execute(request).await {
            Ok(response) => response.body,
            Err(err) => {
                // One transport fault fails every item, but each code still
                // gets its own result.
                let reason = err.to_string();
                return Ok(tracking_codes
                    .iter()
                    .map(|code| (code.clone(), Ok(Shipment::lookup_failure(reason.clone()))))
                    .collect());
            }
        };

        let mut results: Vec<BatchItem> = parse_awb_items(&body)
            .iter()
            .map(|item| (item.awb_number.clone(), Ok(shipment_from_item(item))))
            .collect();

        // Codes the response never mentioned still owe the caller an answer.
        for code in tracking_codes {
            if !results.iter().any(|(awb, _)| awb == code) {
                results.push((
                    code.clone(),
                    Ok(Shipment::lookup_failure(
                        "tracking code missing from carrier response",
                    )),
                ));
            }
        }

        Ok(results)
    }
}

impl ShipmentProvider for Dhl {
    fn name(&self) -> &str {
        "dhl"
    }

    fn track<'a>(
        &'a self,
        tracking_code: &'a str,
        auth: &'a AuthOptions,
    ) -> BoxFuture<'a, ProviderResult<Shipment>> {
        Box::pin(async move {
            let mut batch = self.track_batch(vec![tracking_code.to_string()], auth);
            match batch.next().await {
                Some((_, result)) => result,
                None => Err(ProviderError::internal("carrier response contained no items")
                    .with_provider(self.name())),
            }
        })
    }

    fn track_batch<'a>(
        &'a self,
        tracking_codes: Vec<String>,
        auth: &'a AuthOptions,
    ) -> TrackingBatch<'a>
    where
        Self: Sized,
    {
        TrackingBatch::prefetched(Box::pin(async move {
            match self.request_batch(&tracking_codes, auth).await {
                Ok(items) => items,
                // Configuration failures surface on every item; the error is
                // not cloneable, so rebuild it per code.
                Err(err) => tracking_codes
                    .iter()
                    .map(|code| {
                        (
                            code.clone(),
                            Err(ProviderError::new(err.code(), err.message())
                                .with_provider("dhl")),
                        )
                    })
                    .collect(),
            }
        }))
    }
}

fn request_envelope(
    site_id: &str,
    password: &str,
    awb_numbers: &[String],
    message_time: &str,
) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let mut envelope = BytesStart::new("soapenv:Envelope");
    envelope.push_attribute(("xmlns:soapenv", "http://schemas.xmlsoap.org/soap/envelope/"));
    envelope.push_attribute(("xmlns:dhl", "http://www.dhl.com"));
    writer.write_event(Event::Start(envelope)).unwrap();

    // WSSE username-token header.
    writer
        .write_event(Event::Start(BytesStart::new("soapenv:Header")))
        .unwrap();
    let mut security = BytesStart::new("wsse:Security");
    security.push_attribute(("xmlns:wsse", WSSE_NS));
    writer.write_event(Event::Start(security)).unwrap();
    writer
        .write_event(Event::Start(BytesStart::new("wsse:UsernameToken")))
        .unwrap();
    write_text_element(&mut writer, "wsse:Username", site_id);
    write_text_element(&mut writer, "wsse:Password", password);
    writer
        .write_event(Event::End(BytesEnd::new("wsse:UsernameToken")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("wsse:Security")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Header")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("soapenv:Body")))
        .unwrap();
    writer
        .write_event(Event::Start(BytesStart::new("dhl:TrackingRequest")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("Request")))
        .unwrap();
    writer
        .write_event(Event::Start(BytesStart::new("ServiceHeader")))
        .unwrap();
    write_text_element(&mut writer, "MessageTime", message_time);
    write_text_element(&mut writer, "MessageReference", MESSAGE_REFERENCE);
    writer
        .write_event(Event::End(BytesEnd::new("ServiceHeader")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("Request")))
        .unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("AWBNumber")))
        .unwrap();
    for awb in awb_numbers {
        write_text_element(&mut writer, "ArrayOfAWBNumberItem", awb);
    }
    writer
        .write_event(Event::End(BytesEnd::new("AWBNumber")))
        .unwrap();

    write_text_element(&mut writer, "LevelOfDetails", "LAST_CHECK_POINT_ONLY");
    // B for both, S for shipment details only, P for piece details only.
    write_text_element(&mut writer, "PiecesEnabled", "S");

    writer
        .write_event(Event::End(BytesEnd::new("dhl:TrackingRequest")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Body")))
        .unwrap();
    writer
        .write_event(Event::End(BytesEnd::new("soapenv:Envelope")))
        .unwrap();

    String::from_utf8(writer.into_inner().into_inner()).unwrap_or_default()
}

#[derive(Debug, Default)]
struct AwbItem {
    awb_number: String,
    action_status: String,
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    event_code: String,
    event_description: String,
}

/// Collects the per-AWB items from the tracking response, in document order.
fn parse_awb_items(xml: &str) -> Vec<AwbItem> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<AwbItem> = None;
    let mut current_element: Option<String> = None;
    // The event description and the service-area description share a local
    // name; only the one inside ServiceEvent is the event's.
    let mut in_service_event = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let local = local_name(&name);
                match local {
                    "ArrayOfAWBInfoItem" => {
                        current = Some(AwbItem::default());
                        in_service_event = false;
                    }
                    "ServiceEvent" => in_service_event = true,
                    _ if current.is_some() => current_element = Some(local.to_string()),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match local_name(&name) {
                    "ArrayOfAWBInfoItem" => {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                    }
                    "ServiceEvent" => in_service_event = false,
                    _ => {}
                }
                current_element = None;
            }
            Ok(Event::Text(e)) => {
                if let (Some(item), Some(element)) = (&mut current, &current_element) {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match element.as_str() {
                        "AWBNumber" => item.awb_number = text,
                        "ActionStatus" => item.action_status = text,
                        "Date" => item.date = NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok(),
                        "Time" => item.time = NaiveTime::parse_from_str(&text, "%H:%M:%S").ok(),
                        "EventCode" if in_service_event => item.event_code = text,
                        "Description" if in_service_event => item.event_description = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    items
}

fn shipment_from_item(item: &AwbItem) -> Shipment {
    if !item.action_status.eq_ignore_ascii_case("success") {
        let reason = if item.action_status.is_empty() {
            "carrier rejected the inquiry".to_string()
        } else {
            item.action_status.clone()
        };
        return Shipment::lookup_failure(reason);
    }

    // With LAST_CHECK_POINT_ONLY the carrier reports one event per AWB, and
    // no timezone; times are taken as given.
    let timestamp = item.date.map(|date| match item.time {
        Some(time) => EventTimestamp::from_local(
            date.and_time(time),
            FixedOffset::east_opt(0).expect("valid offset"),
        ),
        None => EventTimestamp::from_date(date),
    });

    let history = if item.event_code.is_empty() && item.event_description.is_empty() {
        Vec::new()
    } else {
        vec![HistoryEntry::new(
            timestamp,
            &item.event_code,
            &item.event_description,
        )]
    };

    let delivery_status = classify_last_entry(
        &history,
        SUCCESSFUL_DELIVERY_EVENT_CODES,
        FAILED_DELIVERY_EVENT_CODES,
    );

    Shipment::lookup_success(history, delivery_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::StubTransport;
    use parceltrack_core::DeliveryStatus;

    const BATCH_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <trackShipmentRequestResponse>
      <trackingResponse>
        <TrackingResponse>
          <AWBInfo>
            <ArrayOfAWBInfoItem>
              <AWBNumber>1234567890</AWBNumber>
              <Status>
                <ActionStatus>success</ActionStatus>
              </Status>
              <ShipmentInfo>
                <ShipmentEvent>
                  <Date>2017-09-05</Date>
                  <Time>10:12:00</Time>
                  <ServiceEvent>
                    <EventCode>OK</EventCode>
                    <Description>Delivered - Signed for by</Description>
                  </ServiceEvent>
                  <ServiceArea>
                    <ServiceAreaCode>YHZ</ServiceAreaCode>
                    <Description>Halifax</Description>
                  </ServiceArea>
                </ShipmentEvent>
              </ShipmentInfo>
            </ArrayOfAWBInfoItem>
            <ArrayOfAWBInfoItem>
              <AWBNumber>9876543210</AWBNumber>
              <Status>
                <ActionStatus>No Shipments Found</ActionStatus>
              </Status>
            </ArrayOfAWBInfoItem>
          </AWBInfo>
        </TrackingResponse>
      </trackingResponse>
    </trackShipmentRequestResponse>
  </soapenv:Body>
</soapenv:Envelope>"#;

    fn auth() -> AuthOptions {
        AuthOptions::new()
            .with("site_id", "SiteId123")
            .with("password", "hunter2")
    }

    fn provider(stub: StubTransport) -> (std::sync::Arc<StubTransport>, Dhl) {
        let stub = std::sync::Arc::new(stub);
        let provider = Dhl::with_transport(stub.clone());
        (stub, provider)
    }

    mod envelope {
        use super::*;

        #[test]
        fn carries_credentials_and_every_awb() {
            let awbs = vec!["1234567890".to_string(), "9876543210".to_string()];
            let xml = request_envelope("SiteId123", "hunter2", &awbs, "2017-09-05T10:00:00-04:00");

            assert!(xml.contains("<wsse:Username>SiteId123</wsse:Username>"));
            assert!(xml.contains("<wsse:Password>hunter2</wsse:Password>"));
            assert!(xml.contains("<ArrayOfAWBNumberItem>1234567890</ArrayOfAWBNumberItem>"));
            assert!(xml.contains("<ArrayOfAWBNumberItem>9876543210</ArrayOfAWBNumberItem>"));
            assert!(xml.contains("<LevelOfDetails>LAST_CHECK_POINT_ONLY</LevelOfDetails>"));
            assert!(xml.contains("<PiecesEnabled>S</PiecesEnabled>"));
            assert!(xml.contains(MESSAGE_REFERENCE));
        }
    }

    mod parsing {
        use super::*;

        #[test]
        fn demultiplexes_per_awb() {
            let items = parse_awb_items(BATCH_RESPONSE);
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].awb_number, "1234567890");
            assert_eq!(items[1].awb_number, "9876543210");
        }

        #[test]
        fn event_description_ignores_the_service_area() {
            let items = parse_awb_items(BATCH_RESPONSE);
            assert_eq!(items[0].event_description, "Delivered - Signed for by");
        }

        #[test]
        fn successful_item_becomes_a_delivered_shipment() {
            let items = parse_awb_items(BATCH_RESPONSE);
            let shipment = shipment_from_item(&items[0]);

            assert!(shipment.lookup_succeeded);
            assert_eq!(shipment.delivery_status, Some(DeliveryStatus::Complete));
            assert_eq!(shipment.history.len(), 1);
            assert_eq!(shipment.history[0].code, "OK");
            assert!(shipment.history[0].timestamp.is_some());
        }

        #[test]
        fn failed_item_carries_the_action_status() {
            let items = parse_awb_items(BATCH_RESPONSE);
            let shipment = shipment_from_item(&items[1]);

            assert!(!shipment.lookup_succeeded);
            assert_eq!(
                shipment.lookup_result.as_deref(),
                Some("No Shipments Found")
            );
        }

        #[test]
        fn returned_code_classifies_as_failed() {
            let xml = BATCH_RESPONSE.replace("<EventCode>OK</EventCode>", "<EventCode>RT</EventCode>");
            let items = parse_awb_items(&xml);
            let shipment = shipment_from_item(&items[0]);

            assert_eq!(shipment.delivery_status, Some(DeliveryStatus::Failed));
        }

        #[test]
        fn unknown_code_classifies_as_in_progress() {
            let xml = BATCH_RESPONSE.replace("<EventCode>OK</EventCode>", "<EventCode>PU</EventCode>");
            let items = parse_awb_items(&xml);
            let shipment = shipment_from_item(&items[0]);

            assert_eq!(shipment.delivery_status, Some(DeliveryStatus::InProgress));
        }

        #[test]
        fn successful_item_without_event_has_no_status() {
            let mut item = AwbItem::default();
            item.awb_number = "555".to_string();
            item.action_status = "success".to_string();

            let shipment = shipment_from_item(&item);
            assert!(shipment.lookup_succeeded);
            assert!(shipment.history.is_empty());
            assert!(shipment.delivery_status.is_none());
        }
    }

    mod batches {
        use super::*;

        #[tokio::test]
        async fn one_wire_call_covers_the_whole_batch() {
            let (stub, provider) = provider(StubTransport::replying(BATCH_RESPONSE));
            let auth = auth();
            let codes = vec!["1234567890".to_string(), "9876543210".to_string()];

            let mut batch = provider.track_batch(codes, &auth);
            assert_eq!(stub.request_count(), 0);

            let (code, result) = batch.next().await.unwrap();
            assert_eq!(code, "1234567890");
            assert!(result.unwrap().is_delivered());
            assert_eq!(stub.request_count(), 1);

            // The second item drains without another request.
            let (code, result) = batch.next().await.unwrap();
            assert_eq!(code, "9876543210");
            assert!(!result.unwrap().lookup_succeeded);
            assert_eq!(stub.request_count(), 1);

            assert!(batch.next().await.is_none());
        }

        #[tokio::test]
        async fn request_envelope_reaches_the_gateway() {
            let (stub, provider) = provider(StubTransport::replying(BATCH_RESPONSE));
            let auth = auth();

            provider
                .track_batch(vec!["1234567890".to_string()], &auth)
                .collect()
                .await;

            let request = stub.last_request().unwrap();
            assert_eq!(request.method, "POST");
            assert_eq!(request.url, ENDPOINT);
            let body = request.body.unwrap();
            assert!(body.contains("TrackingRequest"));
            assert!(body.contains("1234567890"));
        }

        #[tokio::test]
        async fn missing_response_item_still_answers_the_caller() {
            let (_, provider) = provider(StubTransport::replying(BATCH_RESPONSE));
            let auth = auth();
            let codes = vec![
                "1234567890".to_string(),
                "9876543210".to_string(),
                "0000000000".to_string(),
            ];

            let items = provider.track_batch(codes, &auth).collect().await;
            assert_eq!(items.len(), 3);

            let (code, result) = &items[2];
            assert_eq!(code, "0000000000");
            let shipment = result.as_ref().unwrap();
            assert!(!shipment.lookup_succeeded);
            assert!(shipment.lookup_result.is_some());
        }

        #[tokio::test]
        async fn transport_fault_fails_every_item_independently() {
            let (_, provider) = provider(StubTransport::unreachable("gateway unreachable"));
            let auth = auth();
            let codes = vec!["A".to_string(), "B".to_string()];

            let items = provider.track_batch(codes, &auth).collect().await;
            assert_eq!(items.len(), 2);
            for (_, result) in items {
                let shipment = result.unwrap();
                assert!(!shipment.lookup_succeeded);
                assert!(
                    shipment
                        .lookup_result
                        .as_deref()
                        .unwrap()
                        .contains("gateway unreachable")
                );
            }
        }

        #[tokio::test]
        async fn missing_credentials_fail_each_pulled_item() {
            use crate::error::ProviderErrorCode;

            let (stub, provider) = provider(StubTransport::replying(BATCH_RESPONSE));
            let auth = AuthOptions::new().with("site_id", "SiteId123");

            let mut batch = provider.track_batch(vec!["A".to_string()], &auth);
            let (_, result) = batch.next().await.unwrap();

            let err = result.unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
            assert_eq!(stub.request_count(), 0);
        }
    }

    mod single_lookups {
        use super::*;

        #[tokio::test]
        async fn track_delegates_to_a_one_element_batch() {
            let (stub, provider) = provider(StubTransport::replying(BATCH_RESPONSE));

            let shipment = provider.track("1234567890", &auth()).await.unwrap();

            assert!(shipment.is_delivered());
            assert_eq!(stub.request_count(), 1);
        }

        #[tokio::test]
        async fn missing_site_id_fails_fast() {
            use crate::error::ProviderErrorCode;

            let (stub, provider) = provider(StubTransport::replying(BATCH_RESPONSE));
            let auth = AuthOptions::new().with("password", "hunter2");

            let err = provider.track("1234567890", &auth).await.unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::ConfigurationError);
            assert_eq!(stub.request_count(), 0);
        }
    }
}
