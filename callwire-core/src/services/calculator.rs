//! # Calculator Service
//!
//! Arithmetic over 64-bit integers, one operation per call shape.
use crate::context::CallContext;
use crate::grpc::sink::{ResponseSink, ResponseStream, recv_inbound};
use crate::proto::CalculatorService;
use crate::proto::calculator::v1::{
    ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
    PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
    SquareRootResponse, SumRequest, SumResponse,
};
use crate::status::ServiceError;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, instrument};

/// Capacity of the response queue of streamed calls.
const RESPONSE_BUFFER: usize = 16;

/// Trial divisions performed between two safe points of a decomposition.
const DIVISIONS_PER_CHECK: u32 = 10_000;

pub mod methods {
    use crate::grpc::method::{Bidirectional, ClientStreaming, Method, ServerStreaming, Unary};
    use crate::proto::calculator::v1::*;

    pub const SERVICE: &str = "calculator.v1.CalculatorService";

    pub const SUM: Method<SumRequest, SumResponse, Unary> = Method::new(SERVICE, "Sum");
    pub const PRIME_NUMBER_DECOMPOSITION: Method<
        PrimeNumberDecompositionRequest,
        PrimeNumberDecompositionResponse,
        ServerStreaming,
    > = Method::new(SERVICE, "PrimeNumberDecomposition");
    pub const COMPUTE_AVERAGE: Method<ComputeAverageRequest, ComputeAverageResponse, ClientStreaming> =
        Method::new(SERVICE, "ComputeAverage");
    pub const FIND_MAXIMUM: Method<FindMaximumRequest, FindMaximumResponse, Bidirectional> =
        Method::new(SERVICE, "FindMaximum");
    pub const SQUARE_ROOT: Method<SquareRootRequest, SquareRootResponse, Unary> =
        Method::new(SERVICE, "SquareRoot");
}

#[derive(Debug, Default, Clone)]
pub struct CalculatorServiceImpl;

impl CalculatorServiceImpl {
    pub fn new() -> Self {
        Self
    }
}

#[tonic::async_trait]
impl CalculatorService for CalculatorServiceImpl {
    type PrimeNumberDecompositionStream = ResponseStream<PrimeNumberDecompositionResponse>;
    type FindMaximumStream = ResponseStream<FindMaximumResponse>;

    #[instrument(skip_all)]
    async fn sum(&self, request: Request<SumRequest>) -> Result<Response<SumResponse>, Status> {
        let SumRequest { first, second } = request.into_inner();
        info!(first, second, "Sum invoked");

        let result = first.checked_add(second).ok_or_else(|| {
            ServiceError::InvalidArgument(format!("{first} + {second} overflows a 64-bit integer"))
        })?;

        Ok(Response::new(SumResponse { result }))
    }

    #[instrument(skip_all)]
    async fn prime_number_decomposition(
        &self,
        request: Request<PrimeNumberDecompositionRequest>,
    ) -> Result<Response<Self::PrimeNumberDecompositionStream>, Status> {
        let context = CallContext::from_request(&request);
        let number = request.into_inner().number;
        info!(number, "PrimeNumberDecomposition invoked");

        let (sink, stream) = ResponseSink::channel(context, RESPONSE_BUFFER);
        tokio::spawn(async move {
            let mut factors = PrimeFactors::new(number);
            loop {
                let prime_factor = match factors.step(DIVISIONS_PER_CHECK) {
                    FactorStep::Factor(prime_factor) => prime_factor,
                    FactorStep::Pending => {
                        if let Err(err) = sink.check() {
                            return sink.fail(err).await;
                        }
                        tokio::task::yield_now().await;
                        continue;
                    }
                    FactorStep::Done => return,
                };
                if let Err(err) = sink.send(PrimeNumberDecompositionResponse { prime_factor }).await {
                    debug!(%err, "decomposition stopped");
                    return sink.fail(err).await;
                }
            }
        });

        Ok(Response::new(stream))
    }

    #[instrument(skip_all)]
    async fn compute_average(
        &self,
        request: Request<Streaming<ComputeAverageRequest>>,
    ) -> Result<Response<ComputeAverageResponse>, Status> {
        let context = CallContext::from_request(&request);
        let mut inbound = request.into_inner();
        info!("ComputeAverage invoked");

        let (mut total, mut count) = (0i128, 0u64);
        while let Some(ComputeAverageRequest { number }) = recv_inbound(&context, &mut inbound).await? {
            total += i128::from(number);
            count += 1;
        }

        if count == 0 {
            return Err(ServiceError::InvalidArgument(
                "cannot average an empty sequence".to_string(),
            )
            .into());
        }

        let average = total as f64 / count as f64;
        Ok(Response::new(ComputeAverageResponse { average }))
    }

    #[instrument(skip_all)]
    async fn find_maximum(
        &self,
        request: Request<Streaming<FindMaximumRequest>>,
    ) -> Result<Response<Self::FindMaximumStream>, Status> {
        let context = CallContext::from_request(&request);
        let mut inbound = request.into_inner();
        info!("FindMaximum invoked");

        let (sink, stream) = ResponseSink::channel(context, RESPONSE_BUFFER);
        tokio::spawn(async move {
            let mut running = RunningMaximum::default();
            loop {
                let next = recv_inbound(sink.context(), &mut inbound).await;
                let number = match next {
                    Ok(Some(FindMaximumRequest { number })) => number,
                    Ok(None) => return,
                    Err(err) => return sink.fail(err).await,
                };
                if let Some(maximum) = running.observe(number)
                    && let Err(err) = sink.send(FindMaximumResponse { maximum }).await
                {
                    debug!(%err, "running maximum stopped");
                    return sink.fail(err).await;
                }
            }
        });

        Ok(Response::new(stream))
    }

    #[instrument(skip_all)]
    async fn square_root(
        &self,
        request: Request<SquareRootRequest>,
    ) -> Result<Response<SquareRootResponse>, Status> {
        let number = request.into_inner().number;
        info!(number, "SquareRoot invoked");

        if number < 0 {
            return Err(
                ServiceError::InvalidArgument(format!("received a negative number: {number}")).into(),
            );
        }

        Ok(Response::new(SquareRootResponse {
            number_root: (number as f64).sqrt(),
        }))
    }
}

/// Prime factors of `number` in ascending order, with multiplicity. Empty below 2.
pub fn prime_factors(number: i64) -> Vec<i64> {
    PrimeFactors::new(number).collect()
}

/// Outcome of a bounded run of [`PrimeFactors::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorStep {
    Factor(i64),
    /// The division budget ran out before the next factor was found.
    Pending,
    Done,
}

/// Trial-division factorisation that can be driven a bounded number of divisions at a time.
#[derive(Debug, Clone)]
pub struct PrimeFactors {
    remaining: i64,
    divisor: i64,
}

impl PrimeFactors {
    pub fn new(number: i64) -> Self {
        Self {
            remaining: number,
            divisor: 2,
        }
    }

    /// Performs at most `budget` trial divisions looking for the next factor.
    pub fn step(&mut self, budget: u32) -> FactorStep {
        for _ in 0..budget {
            if self.remaining <= 1 {
                return FactorStep::Done;
            }
            if self.divisor > self.remaining / self.divisor {
                let last = self.remaining;
                self.remaining = 1;
                return FactorStep::Factor(last);
            }
            if self.remaining % self.divisor == 0 {
                self.remaining /= self.divisor;
                return FactorStep::Factor(self.divisor);
            }
            self.divisor += 1;
        }
        FactorStep::Pending
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        loop {
            match self.step(u32::MAX) {
                FactorStep::Factor(factor) => return Some(factor),
                FactorStep::Done => return None,
                FactorStep::Pending => {}
            }
        }
    }
}

/// Running maximum of a sequence, reporting each new maximum once.
#[derive(Debug, Default)]
struct RunningMaximum(Option<i64>);

impl RunningMaximum {
    fn observe(&mut self, number: i64) -> Option<i64> {
        match self.0 {
            Some(current) if number <= current => None,
            _ => {
                self.0 = Some(number);
                self.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_factors() {
        assert_eq!(prime_factors(120), vec![2, 2, 2, 3, 5]);
        assert_eq!(prime_factors(97), vec![97]);
        assert_eq!(prime_factors(1), Vec::<i64>::new());
        assert_eq!(prime_factors(-12), Vec::<i64>::new());
        assert_eq!(prime_factors(i64::MAX), vec![7, 7, 73, 127, 337, 92737, 649657]);
    }

    #[test]
    fn test_step_yields_pending_when_budget_runs_out() {
        // 1_000_003 is prime, so no factor shows up within a handful of divisions.
        let mut factors = PrimeFactors::new(2 * 1_000_003);
        assert_eq!(factors.step(1), FactorStep::Factor(2));
        assert_eq!(factors.step(10), FactorStep::Pending);
        assert_eq!(factors.step(u32::MAX), FactorStep::Factor(1_000_003));
        assert_eq!(factors.step(1), FactorStep::Done);
    }

    #[test]
    fn test_running_maximum_reports_new_maxima() {
        let mut maximum = RunningMaximum::default();
        let reported: Vec<_> = [4, 7, 2, 19, 4, 6, 32]
            .into_iter()
            .filter_map(|n| maximum.observe(n))
            .collect();
        assert_eq!(reported, vec![4, 7, 19, 32]);
    }

    #[test]
    fn test_running_maximum_starts_with_negative_values() {
        let mut maximum = RunningMaximum::default();
        assert_eq!(maximum.observe(-5), Some(-5));
        assert_eq!(maximum.observe(-5), None);
        assert_eq!(maximum.observe(-1), Some(-1));
    }
}
