use serde::{Deserialize, Serialize};

/// One device reported by the enumeration command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectedCamera {
    pub model: String,
    pub port: String,
}

/// Parse `gphoto2 --auto-detect` output.
///
/// The first two lines are a header and separator; each following line
/// holds a model name and a port token separated by two or more spaces.
pub fn parse_auto_detect(output: &str) -> Vec<DetectedCamera> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .skip(2)
        .filter_map(split_detect_line)
        .collect()
}

fn split_detect_line(line: &str) -> Option<DetectedCamera> {
    // Model names contain single spaces; the column gap is 2+ spaces
    let gap = line.match_indices("  ").next()?.0;
    let model = line[..gap].trim();
    let port = line[gap..].trim();
    if model.is_empty() || port.is_empty() {
        return None;
    }
    Some(DetectedCamera {
        model: model.to_string(),
        port: port.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Model                          Port
----------------------------------------------------------
Canon EOS 1500D                usb:001,004
Nikon Coolpix S3300            usb:001,007
";

    #[test]
    fn test_parse_auto_detect() {
        let cameras = parse_auto_detect(SAMPLE);
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].model, "Canon EOS 1500D");
        assert_eq!(cameras[0].port, "usb:001,004");
        assert_eq!(cameras[1].model, "Nikon Coolpix S3300");
        assert_eq!(cameras[1].port, "usb:001,007");
    }

    #[test]
    fn test_parse_empty_listing() {
        let output = "Model                          Port\n----------\n";
        assert!(parse_auto_detect(output).is_empty());
        assert!(parse_auto_detect("").is_empty());
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let output = "Model  Port\n----\nno-double-space-here\nUSB PTP Camera    usb:002,003\n";
        let cameras = parse_auto_detect(output);
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].model, "USB PTP Camera");
    }
}
