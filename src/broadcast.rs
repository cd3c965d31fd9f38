/// Broadcasts two tensors against each other the way torch-style
/// frameworks do implicitly.
///
/// The left operand fixes the output rank; a lower-rank right operand is
/// unsqueezed with leading singleton dimensions first. Each tensor then
/// expands its own singleton dimensions to the other's size. Dimensions
/// where both tensors are larger than one are left untouched, so the two
/// returned tensors are only guaranteed to share a shape when the inputs
/// were shape-compatible to begin with — the index-gathering code in the
/// resize transform relies on the one-sided expansion.
///
/// # Example
///
/// ```ignore
/// // a: [N, 1], b: [1, M]  ->  both returned as [N, M]
/// let (a, b) = broadcast!(a: Tensor<B, 2>, b: Tensor<2>);
/// ```
#[macro_export]
macro_rules! broadcast {
    ($lhs:ident: Tensor<$backend:ty, $dim:literal>, $rhs:ident: Tensor<$rhs_dim:literal>) => {{
        let lhs: burn::tensor::Tensor<$backend, $dim> = $lhs.clone();
        let rhs: burn::tensor::Tensor<$backend, $dim> = $rhs.clone().unsqueeze();

        let ldims = lhs.dims();
        let rdims = rhs.dims();

        let mut lshape = ldims;
        let mut rshape = rdims;

        let mut i = 0;
        while i < $dim {
            if ldims[i] == 1 {
                lshape[i] = rdims[i];
            }
            if rdims[i] == 1 {
                rshape[i] = ldims[i];
            }
            i += 1;
        }

        (lhs.expand(lshape), rhs.expand(rshape))
    }};
}
