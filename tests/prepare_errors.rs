mod common;

use actionvm::{Image, PrepareError};
use common::Actions;

#[test]
fn truncated_push_operands_are_rejected() {
    // Declares 5 operand bytes, buffer ends after 3
    let bytes = vec![0x96, 5, 0, 1, 0, 0];
    assert!(matches!(
        Image::prepare(bytes).unwrap_err(),
        PrepareError::UnexpectedEnd { .. }
    ));
}

#[test]
fn missing_length_prefix_is_rejected() {
    let bytes = vec![0x96, 2];
    assert!(matches!(
        Image::prepare(bytes).unwrap_err(),
        PrepareError::UnexpectedEnd { .. }
    ));
}

#[test]
fn dictionary_index_out_of_range_is_rejected() {
    let bytes = Actions::new().constant_pool(&["only"]).push_pool(3).build();
    assert_eq!(
        Image::prepare(bytes).unwrap_err(),
        PrepareError::BadDictionaryIndex { index: 3, offset: 13 }
    );
}

#[test]
fn function_body_past_the_region_is_rejected() {
    // Declares a 200-byte body in a 9-byte buffer
    let bytes = vec![0x9B, 6, 0, b'f', 0, 0, 0, 200, 0];
    assert!(matches!(
        Image::prepare(bytes).unwrap_err(),
        PrepareError::BodyOverrun { .. }
    ));
}

#[test]
fn errors_render_a_useful_message() {
    let message = PrepareError::UnknownPushTag { tag: 42, offset: 7 }.to_string();
    assert!(message.contains("42"));
    assert!(message.contains("7"));
}

#[test]
fn well_formed_buffers_prepare() {
    let bytes = Actions::new().push_f64(1.0).push_str("x").ret().build();
    let image = Image::prepare(bytes).unwrap();
    assert_eq!(image.instr_count(), 3);
}
