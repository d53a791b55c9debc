//! Glue calls into the effect peer runtime
//!
//! Image samplers register their input bounds with the peer, and the source
//! rectangle query for an input is only valid after that registration. The
//! API records registrations as fragments are generated and refuses a query
//! for an input nothing registered.

use hashbrown::HashSet;

use crate::error::{CompileError, CompileResult};

/// Where a sampler's image sits, as glue expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGeometry {
    pub bounds: String,
    pub width: String,
    pub height: String,
}

pub trait EffectPeerApi {
    /// Records the logical bounds of input `input`
    fn set_input_bounds(&mut self, input: u32, bounds: &str) -> String;

    /// Records the physical pixel bounds of input `input`
    fn set_input_native_bounds(&mut self, input: u32, bounds: &str) -> String;

    /// Fills `rect` with the source rectangle of input `input` for the
    /// destination bounds. `transform` is `None` for an untransformed view
    fn texture_coordinates(
        &self,
        owner: &str,
        input: u32,
        rect: &str,
        geometry: &SourceGeometry,
        transform: Option<&str>,
    ) -> CompileResult<String>;

    /// Fetches the float map bound to register `input`
    fn sampler_data(&self, input: u32) -> String;
}

/// Peer API of the SSE software peers
#[derive(Debug, Default)]
pub struct SsePeerApi {
    bounds: HashSet<u32>,
    native_bounds: HashSet<u32>,
}

impl SsePeerApi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EffectPeerApi for SsePeerApi {
    fn set_input_bounds(&mut self, input: u32, bounds: &str) -> String {
        self.bounds.insert(input);
        format!("setInputBounds({input}, {bounds});")
    }

    fn set_input_native_bounds(&mut self, input: u32, bounds: &str) -> String {
        self.native_bounds.insert(input);
        format!("setInputNativeBounds({input}, {bounds});")
    }

    fn texture_coordinates(
        &self,
        owner: &str,
        input: u32,
        rect: &str,
        geometry: &SourceGeometry,
        transform: Option<&str>,
    ) -> CompileResult<String> {
        if !self.bounds.contains(&input) || !self.native_bounds.contains(&input) {
            return Err(CompileError::generation(
                owner,
                format!("source rectangle of input {input} requested before its bounds were registered"),
            ));
        }

        let transform = transform.unwrap_or("BaseTransform.IDENTITY_TRANSFORM");
        let SourceGeometry {
            bounds,
            width,
            height,
        } = geometry;

        Ok(format!(
            "getTextureCoordinates({input}, {rect},\n\
             \x20                     {bounds}.x, {bounds}.y,\n\
             \x20                     {width}, {height},\n\
             \x20                     dstBounds, {transform});"
        ))
    }

    fn sampler_data(&self, input: u32) -> String {
        format!("(FloatMap)getSamplerData({input})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> SourceGeometry {
        SourceGeometry {
            bounds: "src_bounds".to_owned(),
            width: "srcW".to_owned(),
            height: "srcH".to_owned(),
        }
    }

    #[test]
    fn queries_need_registration() {
        let mut peer = SsePeerApi::new();

        let error = peer
            .texture_coordinates("src", 0, "srcRect", &geometry(), None)
            .unwrap_err();
        assert!(error.to_string().contains("`src`"));

        assert_eq!(
            peer.set_input_bounds(0, "src_bounds"),
            "setInputBounds(0, src_bounds);"
        );
        peer.set_input_native_bounds(0, "src_nativeBounds");

        let query = peer
            .texture_coordinates("src", 0, "srcRect", &geometry(), Some("src_transform"))
            .unwrap();
        assert!(query.starts_with("getTextureCoordinates(0, srcRect,"));
        assert!(query.ends_with("dstBounds, src_transform);"));
    }

    #[test]
    fn untransformed_queries_use_identity() {
        let mut peer = SsePeerApi::new();
        peer.set_input_bounds(1, "b");
        peer.set_input_native_bounds(1, "n");

        let query = peer
            .texture_coordinates("lsrc", 1, "lsrcRect", &geometry(), None)
            .unwrap();
        assert!(query.ends_with("dstBounds, BaseTransform.IDENTITY_TRANSFORM);"));
    }
}
