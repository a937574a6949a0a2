//! CSV interchange files: trained weights, image batches, classification
//! labels, synthesized perturbations, and recovered images.
//!
//! The weight format alternates blocks, each introduced by a `rows,cols`
//! header line: even blocks hold a weight matrix stored input-major (rows
//! = fan-in, cols = fan-out, the transpose of the in-memory layout), odd
//! blocks the following bias column. A weight/bias pair defines one
//! computed layer. Any dimensional inconsistency is fatal here, before a
//! single solver session is created.

use crate::bounds::Bounds1;
use crate::dnn::{Layer, Network};
use crate::error::{ModelError, Result};
use crate::formulations::adversarial::InputTransform;
use crate::NNFloat;
use itertools::Itertools;
use ndarray::{Array1, Array2};
use std::fs;
use std::io::Write;
use std::path::Path;

fn parse_float(file: &Path, line: usize, token: &str) -> Result<NNFloat> {
    token.trim().parse().map_err(|_| ModelError::Parse {
        file: file.display().to_string(),
        line,
        token: token.trim().to_string(),
    })
}

fn parse_usize(file: &Path, line: usize, token: &str) -> Result<usize> {
    token.trim().parse().map_err(|_| ModelError::Parse {
        file: file.display().to_string(),
        line,
        token: token.trim().to_string(),
    })
}

/// Reads a weight file into a network whose input bounds default to the
/// `[0, 1]` pixel domain.
pub fn read_weights<P: AsRef<Path>>(path: P) -> Result<Network> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (line_no, first) = lines
        .next()
        .ok_or_else(|| ModelError::TruncatedFile(path.display().to_string()))?;
    let n0 = parse_usize(path, line_no + 1, first.split(',').next().unwrap())?;

    let mut input = Layer::input(n0);
    input.set_x_bounds(Bounds1::unit(n0));
    let mut layers = vec![input];

    let mut pending_weights: Option<Array2<NNFloat>> = None;
    let mut block = 0usize;
    loop {
        let (line_no, header) = match lines.next() {
            Some(pair) => pair,
            None => break,
        };
        let (rows_tok, cols_tok) = header
            .split(',')
            .collect_tuple()
            .ok_or_else(|| ModelError::Parse {
                file: path.display().to_string(),
                line: line_no + 1,
                token: header.trim().to_string(),
            })?;
        let rows = parse_usize(path, line_no + 1, rows_tok)?;
        let cols = parse_usize(path, line_no + 1, cols_tok)?;

        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows {
            let (line_no, row) = lines
                .next()
                .ok_or_else(|| ModelError::TruncatedFile(path.display().to_string()))?;
            let values: Vec<NNFloat> = row
                .split(',')
                .map(|tok| parse_float(path, line_no + 1, tok))
                .collect::<Result<_>>()?;
            if values.len() != cols {
                return Err(ModelError::RowLength {
                    file: path.display().to_string(),
                    line: line_no + 1,
                    expected: cols,
                    found: values.len(),
                });
            }
            data.extend(values);
        }
        let raw = Array2::from_shape_vec((rows, cols), data).unwrap();

        if block % 2 == 0 {
            // weight block: file stores fan-in x fan-out
            pending_weights = Some(raw.reversed_axes().as_standard_layout().to_owned());
        } else {
            let weights = pending_weights.take().unwrap();
            let bias: Array1<NNFloat> =
                Array1::from_iter(raw.rows().into_iter().map(|r| r[r.len() - 1]));
            let k = block / 2 + 1;
            if weights.nrows() != bias.len() {
                return Err(ModelError::BiasMismatch {
                    layer: k,
                    rows: weights.nrows(),
                    bias: bias.len(),
                });
            }
            layers.push(Layer::new(k, weights, bias));
        }
        block += 1;
    }
    if pending_weights.is_some() {
        return Err(ModelError::TruncatedFile(path.display().to_string()));
    }
    Network::new(layers)
}

/// Writes `network` in the block format [`read_weights`] parses. `f64`
/// values are written in their shortest round-trippable form, so a write
/// followed by a read reproduces the matrices bit for bit.
pub fn write_weights<P: AsRef<Path>>(path: P, network: &Network) -> Result<()> {
    let mut out = fs::File::create(path)?;
    writeln!(out, "{}", network.input_dim())?;
    for layer in network.layers().iter().skip(1) {
        let w = layer.weights();
        writeln!(out, "{},{}", w.ncols(), w.nrows())?;
        for i in 0..w.ncols() {
            let row = (0..w.nrows()).map(|j| w[[j, i]].to_string()).join(",");
            writeln!(out, "{}", row)?;
        }
        let bias = layer.bias();
        writeln!(out, "{},1", bias.len())?;
        for b in bias {
            writeln!(out, "{}", b)?;
        }
    }
    Ok(())
}

/// Reads an image batch: a count line, then one flattened image per line.
pub fn read_images<P: AsRef<Path>>(path: P) -> Result<Vec<Array1<NNFloat>>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (line_no, first) = lines
        .next()
        .ok_or_else(|| ModelError::TruncatedFile(path.display().to_string()))?;
    let count = parse_usize(path, line_no + 1, first)?;

    let mut images = Vec::with_capacity(count);
    let mut width = None;
    for _ in 0..count {
        let (line_no, row) = lines
            .next()
            .ok_or_else(|| ModelError::TruncatedFile(path.display().to_string()))?;
        let values: Vec<NNFloat> = row
            .split(',')
            .map(|tok| parse_float(path, line_no + 1, tok))
            .collect::<Result<_>>()?;
        if let Some(width) = width {
            if values.len() != width {
                return Err(ModelError::RowLength {
                    file: path.display().to_string(),
                    line: line_no + 1,
                    expected: width,
                    found: values.len(),
                });
            }
        } else {
            width = Some(values.len());
        }
        images.push(Array1::from_vec(values));
    }
    Ok(images)
}

/// Reads a classification file: a count line, then one integer label per
/// line.
pub fn read_classifications<P: AsRef<Path>>(path: P) -> Result<Vec<usize>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (line_no, first) = lines
        .next()
        .ok_or_else(|| ModelError::TruncatedFile(path.display().to_string()))?;
    let count = parse_usize(path, line_no + 1, first)?;
    let mut labels = Vec::with_capacity(count);
    for _ in 0..count {
        let (line_no, row) = lines
            .next()
            .ok_or_else(|| ModelError::TruncatedFile(path.display().to_string()))?;
        labels.push(parse_usize(path, line_no + 1, row)?);
    }
    Ok(labels)
}

/// Writes a synthesized transform, one input dimension per line: `p,q`,
/// or a single column when only one component was searched.
pub fn write_perturbation<P: AsRef<Path>>(
    path: P,
    transform: &InputTransform,
    scale: bool,
    shift: bool,
) -> Result<()> {
    let mut out = fs::File::create(path)?;
    for i in 0..transform.scale.len() {
        match (scale, shift) {
            (true, true) => writeln!(out, "{},{}", transform.scale[i], transform.shift[i])?,
            (true, false) => writeln!(out, "{}", transform.scale[i])?,
            (false, true) => writeln!(out, "{}", transform.shift[i])?,
            (false, false) => {}
        }
    }
    Ok(())
}

/// Reads a perturbation file written by [`write_perturbation`] with the
/// same component flags; missing components come back as the identity.
pub fn read_perturbation<P: AsRef<Path>>(path: P, scale: bool, shift: bool) -> Result<InputTransform> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut p = Vec::new();
    let mut q = Vec::new();
    for (line_no, row) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let values: Vec<NNFloat> = row
            .split(',')
            .map(|tok| parse_float(path, line_no + 1, tok))
            .collect::<Result<_>>()?;
        let expected = usize::from(scale) + usize::from(shift);
        if values.len() != expected {
            return Err(ModelError::RowLength {
                file: path.display().to_string(),
                line: line_no + 1,
                expected,
                found: values.len(),
            });
        }
        let mut it = values.into_iter();
        if scale {
            p.push(it.next().unwrap());
        }
        if shift {
            q.push(it.next().unwrap());
        }
    }
    let dim = p.len().max(q.len());
    Ok(InputTransform {
        scale: if scale { Array1::from_vec(p) } else { Array1::ones(dim) },
        shift: if shift { Array1::from_vec(q) } else { Array1::zeros(dim) },
    })
}

/// Writes a flattened image as a `width`-column grid (28 for MNIST).
///
/// # Panics
/// If the image length is not a multiple of `width`.
pub fn write_image<P: AsRef<Path>>(path: P, image: &Array1<NNFloat>, width: usize) -> Result<()> {
    assert_eq!(image.len() % width, 0);
    let mut out = fs::File::create(path)?;
    for row in image.exact_chunks(width) {
        writeln!(out, "{}", row.iter().map(|v| v.to_string()).join(","))?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use ndarray::array;
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn scratch(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("relumilp_{}_{}", std::process::id(), name));
        path
    }

    #[test]
    fn test_weight_file_round_trip_fixed() {
        let net = fixed_network();
        let path = scratch("weights_fixed.csv");
        write_weights(&path, &net).unwrap();
        let back = read_weights(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(net.num_layers(), back.num_layers());
        for (a, b) in net.layers().iter().zip(back.layers().iter()).skip(1) {
            assert_eq!(a.weights(), b.weights());
            assert_eq!(a.bias(), b.bias());
        }
    }

    proptest! {
        #[test]
        fn test_weight_file_round_trip(net in fc_network(4, 3, 2, 6)) {
            let path = scratch("weights_prop.csv");
            write_weights(&path, &net).unwrap();
            let back = read_weights(&path).unwrap();
            std::fs::remove_file(&path).unwrap();
            for (a, b) in net.layers().iter().zip(back.layers().iter()).skip(1) {
                prop_assert_eq!(a.weights(), b.weights());
                prop_assert_eq!(a.bias(), b.bias());
            }
        }
    }

    #[test]
    fn test_mismatched_weight_file_is_fatal() {
        let path = scratch("weights_bad.csv");
        // 2 inputs, but a 3-wide weight block
        std::fs::write(&path, "2\n3,2\n1,0\n0,1\n1,1\n2,1\n0.5\n0.5\n").unwrap();
        let result = read_weights(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(ModelError::Dimension { .. })));
    }

    #[test]
    fn test_images_and_classes() {
        let ipath = scratch("images.csv");
        let cpath = scratch("classes.csv");
        std::fs::write(&ipath, "2\n0.5,0.25,0,1\n1,0,0.75,0.125\n").unwrap();
        std::fs::write(&cpath, "2\n1\n0\n").unwrap();
        let images = read_images(&ipath).unwrap();
        let classes = read_classifications(&cpath).unwrap();
        std::fs::remove_file(&ipath).unwrap();
        std::fs::remove_file(&cpath).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0], array![0.5, 0.25, 0., 1.]);
        assert_eq!(classes, vec![1, 0]);
    }

    #[test]
    fn test_perturbation_round_trip() {
        let transform = InputTransform {
            scale: array![1., 0.5, 2.],
            shift: array![0., -0.25, 0.125],
        };
        let path = scratch("perturb.csv");
        write_perturbation(&path, &transform, true, true).unwrap();
        let back = read_perturbation(&path, true, true).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(transform, back);

        let path = scratch("perturb_q.csv");
        write_perturbation(&path, &transform, false, true).unwrap();
        let back = read_perturbation(&path, false, true).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back.scale, array![1., 1., 1.]);
        assert_eq!(back.shift, transform.shift);
    }

    #[test]
    fn test_image_grid_write() {
        let path = scratch("image.csv");
        let image = Array1::from_iter((0..4).map(|i| i as f64 / 4.));
        write_image(&path, &image, 2).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(text, "0,0.25\n0.5,0.75\n");
    }
}
