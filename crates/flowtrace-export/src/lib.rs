//! flowtrace-export: Pure format serializers (sans-IO)
//!
//! Renders line layers and trace results into output formats. Currently
//! supports SVG previews.

pub mod svg;

pub use svg::{SvgMetadata, SvgStyle, build_path_data, to_svg, to_svg_with_points};
