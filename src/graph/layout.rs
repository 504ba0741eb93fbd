const PORT_LABEL_HEIGHT: f64 = 20.0;
const PORT_PAIR_GAP: f64 = 5.0;

/// Vertical offset for a node's inner form so the port type labels drawn
/// beside each port do not overlap it.
pub fn content_offset(input_count: usize, output_count: usize) -> f64 {
    let ports = input_count.max(output_count) as f64;
    let mut offset = PORT_LABEL_HEIGHT * ports;
    if ports > 1.0 {
        offset += (ports / 2.0) * PORT_PAIR_GAP;
    }
    offset
}
