//! Descriptors of the media server's core entity kinds.
//!
//! MediaObject
//! ├── MediaPipeline
//! └── MediaElement
//!     └── Endpoint
//!         ├── UriEndpoint
//!         └── SdpEndpoint
//!             └── BaseRtpEndpoint

use rom_types::{EntityDescriptor, OperationSpec, ParamSpec, ParamType};
use std::sync::{Arc, OnceLock};

/// Server module holding the core kinds.
pub const CORE_MODULE: &str = "kurento";

fn media_type() -> ParamType {
    ParamType::enumeration("MediaType", &["AUDIO", "DATA", "VIDEO"])
}

fn connection_state() -> ParamType {
    ParamType::enumeration("ConnectionState", &["DISCONNECTED", "CONNECTED"])
}

fn media_state() -> ParamType {
    ParamType::enumeration("MediaState", &["DISCONNECTED", "CONNECTED"])
}

struct Catalog {
    media_object: Arc<EntityDescriptor>,
    media_pipeline: Arc<EntityDescriptor>,
    media_element: Arc<EntityDescriptor>,
    endpoint: Arc<EntityDescriptor>,
    uri_endpoint: Arc<EntityDescriptor>,
    sdp_endpoint: Arc<EntityDescriptor>,
    base_rtp_endpoint: Arc<EntityDescriptor>,
}

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(build)
}

fn build() -> Catalog {
    let media_object = EntityDescriptor::root("MediaObject", CORE_MODULE)
        .operation(OperationSpec::getter("mediaPipeline", ParamType::object("MediaPipeline")))
        .operation(OperationSpec::getter("parent", ParamType::object("MediaObject")))
        .event("Error");

    let media_pipeline = EntityDescriptor::extends(&media_object, "MediaPipeline");

    let media_element = EntityDescriptor::extends(&media_object, "MediaElement")
        .constructor_param(ParamSpec::required(
            "mediaPipeline",
            ParamType::object("MediaPipeline"),
        ))
        .parent_param("mediaPipeline")
        .operation(
            OperationSpec::new("connect")
                .param(ParamSpec::required("sink", ParamType::object("MediaElement")))
                .param(ParamSpec::optional("mediaType", media_type()))
                .param(ParamSpec::optional("mediaDescription", ParamType::String)),
        )
        .operation(
            OperationSpec::new("getMediaSinks")
                .param(ParamSpec::optional("mediaType", media_type()))
                .param(ParamSpec::optional("description", ParamType::String))
                .returns(ParamType::list(ParamType::object("MediaSink"))),
        )
        .operation(
            OperationSpec::new("getMediaSrcs")
                .param(ParamSpec::optional("mediaType", media_type()))
                .param(ParamSpec::optional("description", ParamType::String))
                .returns(ParamType::list(ParamType::object("MediaSource"))),
        );

    let endpoint = EntityDescriptor::extends(&media_element, "Endpoint");

    let uri_endpoint = EntityDescriptor::extends(&endpoint, "UriEndpoint")
        .constructor_param(ParamSpec::required("uri", ParamType::String))
        .operation(OperationSpec::getter("uri", ParamType::String))
        .operation(OperationSpec::new("pause"))
        .operation(OperationSpec::new("stop"));

    let sdp_endpoint = EntityDescriptor::extends(&endpoint, "SdpEndpoint")
        .operation(OperationSpec::new("generateOffer").returns(ParamType::String))
        .operation(
            OperationSpec::new("processOffer")
                .param(ParamSpec::required("offer", ParamType::String))
                .returns(ParamType::String),
        )
        .operation(
            OperationSpec::new("processAnswer")
                .param(ParamSpec::required("answer", ParamType::String))
                .returns(ParamType::String),
        )
        .operation(OperationSpec::getter("localSessionDescriptor", ParamType::String))
        .operation(OperationSpec::getter("remoteSessionDescriptor", ParamType::String));

    let base_rtp_endpoint = EntityDescriptor::extends(&sdp_endpoint, "BaseRtpEndpoint")
        .operation(OperationSpec::getter("connectionState", connection_state()))
        .operation(OperationSpec::getter("mediaState", media_state()))
        .operation(OperationSpec::getter("maxVideoSendBandwidth", ParamType::int()))
        .operation(OperationSpec::setter("maxVideoSendBandwidth", ParamType::int()))
        .operation(OperationSpec::getter("minVideoRecvBandwidth", ParamType::int()))
        .operation(OperationSpec::setter("minVideoRecvBandwidth", ParamType::int()))
        .operation(OperationSpec::getter("minVideoSendBandwidth", ParamType::int()))
        .operation(OperationSpec::setter("minVideoSendBandwidth", ParamType::int()))
        .operation(OperationSpec::getter("mtu", ParamType::int()))
        .operation(OperationSpec::setter("mtu", ParamType::int()))
        .operation(OperationSpec::getter("rembParams", ParamType::complex("RembParams")))
        .operation(OperationSpec::setter("rembParams", ParamType::complex("RembParams")))
        .operation(OperationSpec::new("requestKeyframe"))
        .event("ConnectionStateChanged")
        .event("MediaStateChanged");

    Catalog {
        media_object: Arc::new(media_object),
        media_pipeline: Arc::new(media_pipeline),
        media_element: Arc::new(media_element),
        endpoint: Arc::new(endpoint),
        uri_endpoint: Arc::new(uri_endpoint),
        sdp_endpoint: Arc::new(sdp_endpoint),
        base_rtp_endpoint: Arc::new(base_rtp_endpoint),
    }
}

pub fn media_object() -> Arc<EntityDescriptor> {
    catalog().media_object.clone()
}

pub fn media_pipeline() -> Arc<EntityDescriptor> {
    catalog().media_pipeline.clone()
}

pub fn media_element() -> Arc<EntityDescriptor> {
    catalog().media_element.clone()
}

pub fn endpoint() -> Arc<EntityDescriptor> {
    catalog().endpoint.clone()
}

pub fn uri_endpoint() -> Arc<EntityDescriptor> {
    catalog().uri_endpoint.clone()
}

pub fn sdp_endpoint() -> Arc<EntityDescriptor> {
    catalog().sdp_endpoint.clone()
}

pub fn base_rtp_endpoint() -> Arc<EntityDescriptor> {
    catalog().base_rtp_endpoint.clone()
}

/// Look up a core kind by its server type name.
pub fn by_name(name: &str) -> Option<Arc<EntityDescriptor>> {
    let c = catalog();
    let descriptor = match name {
        "MediaObject" => &c.media_object,
        "MediaPipeline" => &c.media_pipeline,
        "MediaElement" => &c.media_element,
        "Endpoint" => &c.endpoint,
        "UriEndpoint" => &c.uri_endpoint,
        "SdpEndpoint" => &c.sdp_endpoint,
        "BaseRtpEndpoint" => &c.base_rtp_endpoint,
        _ => return None,
    };
    Some(descriptor.clone())
}
