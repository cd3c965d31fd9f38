use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde::Deserialize;

use crate::labels::ClassMap;

/// Optional per-image training weights, one `<image id> <weight>` pair per
/// line, located in the dataset root. Images without an entry get 1.0.
pub const SAMPLE_WEIGHTS_FILE: &str = "sampleweights.txt";

/// One annotated image of the underwater dataset.
///
/// Boxes are pixel-space xyxy; labels are model class ids (1-based, 0 is
/// background and never appears here). The image itself is loaded by the
/// batcher, so dataset construction touches only the annotation XML.
#[derive(Debug, Clone)]
pub struct VocSample {
    pub id: String,
    pub image_path: PathBuf,
    pub boxes: Vec<[f32; 4]>,
    pub labels: Vec<usize>,
    pub weight: f32,
}

// PASCAL VOC annotation XML, reduced to the fields the trainer reads.

#[derive(Debug, Deserialize)]
struct VocAnnotation {
    #[serde(default, rename = "object")]
    objects: Vec<VocObject>,
}

#[derive(Debug, Deserialize)]
struct VocObject {
    name: String,
    #[serde(default)]
    difficult: u8,
    bndbox: VocBndBox,
}

#[derive(Debug, Deserialize)]
struct VocBndBox {
    xmin: f32,
    ymin: f32,
    xmax: f32,
    ymax: f32,
}

/// A PASCAL-VOC layout detection dataset:
///
/// ```text
/// <root>/JPEGImages/<id>.jpg
/// <root>/Annotations/<id>.xml
/// <root>/ImageSets/Main/trainval.txt
/// <root>/ImageSets/Main/test.txt
/// <root>/sampleweights.txt            (optional, training only)
/// ```
///
/// Images whose annotation contains no usable object are skipped entirely,
/// since an SSD batch element without positives contributes nothing to the
/// loss.
pub struct VocDataSet {
    samples: Vec<VocSample>,
}

impl VocDataSet {
    /// The training split. Objects marked `difficult` are kept; per-image
    /// sample weights are read when the weights file exists.
    pub fn trainval(root: &str, classes: &ClassMap) -> Result<Self> {
        Self::load(root, "trainval.txt", classes, false, true)
    }

    /// The validation split. Objects marked `difficult` are excluded and
    /// every image weighs 1.0.
    pub fn test(root: &str, classes: &ClassMap) -> Result<Self> {
        Self::load(root, "test.txt", classes, true, false)
    }

    fn load(
        root: &str,
        image_set: &str,
        classes: &ClassMap,
        exclude_difficult: bool,
        with_sample_weights: bool,
    ) -> Result<Self> {
        let root = Path::new(root);

        let set_path = root.join("ImageSets/Main").join(image_set);
        let set_file = fs::read_to_string(&set_path)
            .with_context(|| format!("image set file {} not found", set_path.display()))?;

        let weights = if with_sample_weights {
            load_sample_weights(root)?
        } else {
            HashMap::new()
        };

        let mut samples = vec![];
        let mut skipped = 0;

        for id in set_file.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let ann_path = root.join("Annotations").join(format!("{id}.xml"));
            let xml = fs::read_to_string(&ann_path)
                .with_context(|| format!("annotation {} not found", ann_path.display()))?;

            let (boxes, labels) = parse_objects(&xml, classes, exclude_difficult)
                .with_context(|| format!("malformed annotation {}", ann_path.display()))?;

            if boxes.is_empty() {
                skipped += 1;
                continue;
            }

            samples.push(VocSample {
                id: id.to_string(),
                image_path: root.join("JPEGImages").join(format!("{id}.jpg")),
                boxes,
                labels,
                weight: *weights.get(id).unwrap_or(&1.0),
            });
        }

        if skipped > 0 {
            log::info!("{image_set}: skipped {skipped} images without ground truth objects");
        }

        Ok(VocDataSet { samples })
    }
}

impl Dataset<VocSample> for VocDataSet {
    fn get(&self, index: usize) -> Option<VocSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Extracts boxes and model class ids from one annotation XML.
///
/// Objects of unknown classes are dropped with a warning rather than
/// failing the run, so a dataset annotated with extra species still trains.
fn parse_objects(
    xml: &str,
    classes: &ClassMap,
    exclude_difficult: bool,
) -> Result<(Vec<[f32; 4]>, Vec<usize>)> {
    let ann: VocAnnotation = serde_xml_rs::from_str(xml)?;

    let mut boxes = vec![];
    let mut labels = vec![];

    for obj in ann.objects {
        if exclude_difficult && obj.difficult != 0 {
            continue;
        }

        let Some(label) = classes.name_to_id(&obj.name) else {
            log::warn!("unknown object class '{}', skipping", obj.name);
            continue;
        };

        boxes.push([
            obj.bndbox.xmin,
            obj.bndbox.ymin,
            obj.bndbox.xmax,
            obj.bndbox.ymax,
        ]);
        labels.push(label);
    }

    Ok((boxes, labels))
}

/// Reads the optional per-image weight file. Blank lines and `#` comments
/// are ignored.
fn load_sample_weights(root: &Path) -> Result<HashMap<String, f32>> {
    let path = root.join(SAMPLE_WEIGHTS_FILE);

    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = fs::read_to_string(&path)?;
    let mut weights = HashMap::new();

    for line in file.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split_whitespace();
        let (Some(id), Some(weight)) = (parts.next(), parts.next()) else {
            anyhow::bail!("malformed sample weight line: '{line}'");
        };

        let weight: f32 = weight
            .parse()
            .with_context(|| format!("malformed sample weight for image '{id}'"))?;

        weights.insert(id.to_string(), weight);
    }

    log::info!("loaded {} sample weights from {}", weights.len(), path.display());

    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNOTATION: &str = r#"
        <annotation>
            <folder>dataset</folder>
            <filename>000042.jpg</filename>
            <size><width>720</width><height>405</height><depth>3</depth></size>
            <object>
                <name>seaurchin</name>
                <difficult>0</difficult>
                <bndbox>
                    <xmin>102</xmin><ymin>44</ymin><xmax>155</xmax><ymax>95</ymax>
                </bndbox>
            </object>
            <object>
                <name>scallop</name>
                <difficult>1</difficult>
                <bndbox>
                    <xmin>300</xmin><ymin>200</ymin><xmax>340</xmax><ymax>245</ymax>
                </bndbox>
            </object>
            <object>
                <name>kelp</name>
                <difficult>0</difficult>
                <bndbox>
                    <xmin>1</xmin><ymin>1</ymin><xmax>20</xmax><ymax>20</ymax>
                </bndbox>
            </object>
        </annotation>"#;

    #[test]
    fn parse_keeps_known_classes() {
        let classes = ClassMap::new();
        let (boxes, labels) = parse_objects(ANNOTATION, &classes, false).unwrap();

        // the unknown 'kelp' object is dropped
        assert_eq!(boxes.len(), 2);
        assert_eq!(labels, vec![2, 3]);
        assert_eq!(boxes[0], [102.0, 44.0, 155.0, 95.0]);
    }

    #[test]
    fn parse_can_exclude_difficult() {
        let classes = ClassMap::new();
        let (boxes, labels) = parse_objects(ANNOTATION, &classes, true).unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(labels, vec![2]);
    }

    #[test]
    fn parse_empty_annotation() {
        let classes = ClassMap::new();
        let (boxes, labels) =
            parse_objects("<annotation><filename>x.jpg</filename></annotation>", &classes, false)
                .unwrap();

        assert!(boxes.is_empty());
        assert!(labels.is_empty());
    }

    #[test]
    fn sample_weights_parse() {
        let dir = std::env::temp_dir().join("seadet-weights-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(SAMPLE_WEIGHTS_FILE),
            "# boosting round 3\n000001 1.25\n000002 0.5\n\n",
        )
        .unwrap();

        let weights = load_sample_weights(&dir).unwrap();

        assert_eq!(weights.len(), 2);
        assert_eq!(weights["000001"], 1.25);
        assert_eq!(weights["000002"], 0.5);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sample_weights_missing_file_is_empty() {
        let dir = std::env::temp_dir().join("seadet-no-weights-test");
        fs::create_dir_all(&dir).unwrap();

        let weights = load_sample_weights(&dir).unwrap();
        assert!(weights.is_empty());

        fs::remove_dir_all(&dir).ok();
    }
}
