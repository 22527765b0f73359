//! Savitzky-Golay 平滑系数
//!
//! 对长度为 `L = 2h + 1` 的窗口做 `O` 阶最小二乘多项式拟合，
//! 窗口中心点的拟合值是窗口内样本的线性组合，系数只与 `(L, O)` 有关。

use crate::filter::FilterError;
use nalgebra::DMatrix;

/// 计算平滑（零阶导数）卷积系数
///
/// 系数为 `(AᵀA)⁻¹Aᵀ` 的第一行，其中 `A[k][p] = ((k - h) / h)^p`。
/// 横坐标按 `h` 归一化以改善大窗口下的条件数，不影响中心点的拟合值。
pub fn savgol_coefficients(window: usize, order: usize) -> Result<Vec<f64>, FilterError> {
    if window == 0 {
        return Err(FilterError::InvalidWindow(window));
    }
    if window % 2 == 0 {
        return Err(FilterError::EvenWindow(window));
    }
    if order >= window {
        return Err(FilterError::OrderTooHigh { order, window });
    }

    let half = (window - 1) / 2;
    let scale = half.max(1) as f64;

    let vandermonde = DMatrix::from_fn(window, order + 1, |k, p| {
        let x = (k as f64 - half as f64) / scale;
        x.powi(p as i32)
    });

    let normal = vandermonde.transpose() * &vandermonde;
    let inverse = normal
        .try_inverse()
        .ok_or(FilterError::Singular { window, order })?;
    let projection = inverse * vandermonde.transpose();

    Ok(projection.row(0).iter().copied().collect())
}

/// 镜像边界扩展（不重复边界样本）
///
/// `[a b c d]` 扩展为 `c b | a b c d | c b`。
/// 要求越界距离小于 `len`（窗口半宽总是满足）。
pub fn mirror_index(index: isize, len: usize) -> usize {
    let last = len as isize - 1;
    if last <= 0 {
        return 0;
    }
    let mirrored = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    mirrored.clamp(0, last) as usize
}
