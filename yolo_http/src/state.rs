use crate::config::{LabelsConfig, Validatable};
use image::Rgb;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLabel {
    pub label: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ColorLabel {
    pub fn color(&self) -> Rgb<u8> {
        Rgb([self.red, self.green, self.blue])
    }
}

pub trait LabelState: Send + Sync + 'static {
    fn new(labels_cfg: &LabelsConfig) -> Result<Self, String>
    where
        Self: Sized;
    fn get_labels(&self) -> &Vec<ColorLabel>;
}

#[derive(Debug)]
pub struct ServiceState {
    class_labels: Vec<ColorLabel>,
}

impl LabelState for ServiceState {
    fn new(labels_cfg: &LabelsConfig) -> Result<ServiceState, String> {
        match load_yolov8_labels(&labels_cfg.get_path()) {
            Ok(labels) if labels.is_empty() => Err(format!(
                "Labels file {:?} contains no labels",
                labels_cfg.get_path()
            )),
            Ok(labels) => Ok(ServiceState {
                class_labels: labels,
            }),
            Err(e) => Err(format!("Failed to load labels: {}", e)),
        }
    }

    fn get_labels(&self) -> &Vec<ColorLabel> {
        &self.class_labels
    }
}

fn parse_channel(value: &str, channel: &str) -> io::Result<u8> {
    value.trim().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, value.trim()),
        )
    })
}

/// Reads one `label,red,green,blue` entry per line; the line index is the class id.
pub fn load_yolov8_labels(filepath: &Path) -> io::Result<Vec<ColorLabel>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut color_labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();

        if parts.len() == 4 {
            color_labels.push(ColorLabel {
                label: parts[0].trim().to_string(),
                red: parse_channel(parts[1], "red")?,
                green: parse_channel(parts[2], "green")?,
                blue: parse_channel(parts[3], "blue")?,
            });
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid line format: {}", line),
            ));
        }
    }

    Ok(color_labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels_config(contents: &str) -> (tempfile::TempDir, LabelsConfig) {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("test.labels")).unwrap();
        file.write_all(contents.as_bytes()).unwrap();

        let cfg = LabelsConfig {
            labels_file: "test.labels".to_string(),
            labels_dir: dir.path().to_path_buf(),
        };
        (dir, cfg)
    }

    #[test]
    fn test_load_labels() {
        let (_dir, cfg) = labels_config("person, 255, 56, 56\nbicycle,255,157,151\n\n");

        let state = ServiceState::new(&cfg).unwrap();
        let labels = state.get_labels();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].label, "person");
        assert_eq!(labels[0].color(), Rgb([255, 56, 56]));
        assert_eq!(labels[1].label, "bicycle");
    }

    #[test]
    fn test_invalid_line_format() {
        let (_dir, cfg) = labels_config("person,255,56\n");
        assert!(ServiceState::new(&cfg).is_err());
    }

    #[test]
    fn test_out_of_range_channel() {
        let (_dir, cfg) = labels_config("person,256,0,0\n");
        let err = ServiceState::new(&cfg).unwrap_err();
        assert!(err.contains("red"));
    }

    #[test]
    fn test_empty_labels_file() {
        let (_dir, cfg) = labels_config("");
        assert!(ServiceState::new(&cfg).is_err());
    }
}
