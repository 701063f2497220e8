//! 可插拔的路线优化策略
//!
//! 默认是遗传算法（有界迭代的启发式，不保证最优）；
//! 站点数很小时可替换为最近邻等更直接的求解器

use courier_domain::{GeoPoint, RouteStop};
use courier_geo::haversine_km;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::RoutingConfig;

pub trait OptimizationStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// 返回 stops 下标的访问顺序
    fn optimize(&self, start: GeoPoint, stops: &[RouteStop]) -> Vec<usize>;
}

/// 最近邻贪心，适合小规模站点的快速替代
pub struct NearestNeighborStrategy;

impl OptimizationStrategy for NearestNeighborStrategy {
    fn name(&self) -> &str {
        "nearest_neighbor"
    }

    fn optimize(&self, start: GeoPoint, stops: &[RouteStop]) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..stops.len()).collect();
        let mut order = Vec::with_capacity(stops.len());
        let mut current = start;
        while !remaining.is_empty() {
            let (pos, _) = remaining
                .iter()
                .enumerate()
                .map(|(pos, &i)| (pos, haversine_km(current, stops[i].location)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .expect("remaining is non-empty");
            let i = remaining.swap_remove(pos);
            current = stops[i].location;
            order.push(i);
        }
        order
    }
}

/// 遗传算法：随机初始种群（偏向优先级靠前）、
/// 保留前半、顺序交叉、随机交换变异、固定代数迭代
pub struct GeneticStrategy {
    config: RoutingConfig,
}

impl GeneticStrategy {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// 适应度：基础 1000，按总距离扣 2 分/公里，
    /// 高优先级站点排在前三分之一各加 50
    fn fitness(start: GeoPoint, stops: &[RouteStop], order: &[usize]) -> f64 {
        let mut total = 0.0;
        let mut current = start;
        for &i in order {
            total += haversine_km(current, stops[i].location);
            current = stops[i].location;
        }
        let mut fitness = 1000.0 - total * 2.0;
        let front = (order.len().max(1)).div_ceil(3);
        for (rank, &i) in order.iter().enumerate() {
            if stops[i].priority >= 4 && rank < front {
                fitness += 50.0;
            }
        }
        fitness.max(0.0)
    }

    /// 顺序交叉：取 parent1 前段，其余按 parent2 的顺序补齐
    fn crossover(rng: &mut StdRng, parent1: &[usize], parent2: &[usize]) -> Vec<usize> {
        if parent1.len() <= 1 {
            return parent1.to_vec();
        }
        let cut = rng.random_range(1..parent1.len());
        let mut child: Vec<usize> = parent1[..cut].to_vec();
        for &i in parent2 {
            if !child.contains(&i) {
                child.push(i);
            }
        }
        child
    }

    fn mutate(rng: &mut StdRng, order: &mut [usize]) {
        if order.len() < 2 {
            return;
        }
        let a = rng.random_range(0..order.len());
        let b = rng.random_range(0..order.len());
        order.swap(a, b);
    }
}

impl OptimizationStrategy for GeneticStrategy {
    fn name(&self) -> &str {
        "genetic"
    }

    fn optimize(&self, start: GeoPoint, stops: &[RouteStop]) -> Vec<usize> {
        if stops.len() <= 1 {
            return (0..stops.len()).collect();
        }
        let mut rng = self.rng();
        let size = self.config.population_size.max(2);

        // 初始种群：随机排列，其中一部分按优先级降序排好作偏置
        let mut population: Vec<Vec<usize>> = Vec::with_capacity(size);
        let mut by_priority: Vec<usize> = (0..stops.len()).collect();
        by_priority.sort_by(|&a, &b| stops[b].priority.cmp(&stops[a].priority));
        population.push(by_priority);
        while population.len() < size {
            let mut order: Vec<usize> = (0..stops.len()).collect();
            order.shuffle(&mut rng);
            population.push(order);
        }

        for _ in 0..self.config.generations {
            let mut scored: Vec<(f64, Vec<usize>)> = population
                .drain(..)
                .map(|order| (Self::fitness(start, stops, &order), order))
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            scored.truncate(size / 2);

            let survivors: Vec<Vec<usize>> = scored.into_iter().map(|(_, o)| o).collect();
            population = survivors.clone();
            while population.len() < size {
                let p1 = &survivors[rng.random_range(0..survivors.len())];
                let p2 = &survivors[rng.random_range(0..survivors.len())];
                let mut child = Self::crossover(&mut rng, p1, p2);
                if rng.random::<f64>() < self.config.mutation_rate {
                    Self::mutate(&mut rng, &mut child);
                }
                population.push(child);
            }
        }

        population
            .into_iter()
            .map(|order| (Self::fitness(start, stops, &order), order))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, order)| order)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_domain::StopKind;

    fn stop(lat: f64, lon: f64) -> RouteStop {
        RouteStop::new(StopKind::Delivery, GeoPoint::new(lat, lon), "stop")
    }

    fn total_distance(start: GeoPoint, stops: &[RouteStop], order: &[usize]) -> f64 {
        let mut current = start;
        let mut total = 0.0;
        for &i in order {
            total += haversine_km(current, stops[i].location);
            current = stops[i].location;
        }
        total
    }

    #[test]
    fn test_nearest_neighbor_ordering() {
        let start = GeoPoint::new(48.85, 2.35);
        let stops = vec![stop(48.95, 2.35), stop(48.86, 2.35), stop(48.90, 2.35)];
        let order = NearestNeighborStrategy.optimize(start, &stops);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_genetic_returns_permutation() {
        let strategy = GeneticStrategy::new(RoutingConfig {
            seed: Some(7),
            ..Default::default()
        });
        let start = GeoPoint::new(48.85, 2.35);
        let stops: Vec<RouteStop> = (0..8)
            .map(|i| stop(48.85 + i as f64 * 0.01, 2.35 + (i % 3) as f64 * 0.02))
            .collect();
        let order = strategy.optimize(start, &stops);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_genetic_deterministic_with_seed() {
        let config = RoutingConfig {
            seed: Some(42),
            ..Default::default()
        };
        let start = GeoPoint::new(48.85, 2.35);
        let stops: Vec<RouteStop> = (0..10)
            .map(|i| stop(48.85 + (i * 7 % 10) as f64 * 0.012, 2.35 + (i * 3 % 7) as f64 * 0.015))
            .collect();
        let a = GeneticStrategy::new(config.clone()).optimize(start, &stops);
        let b = GeneticStrategy::new(config).optimize(start, &stops);
        assert_eq!(a, b);
    }

    #[test]
    fn test_genetic_beats_worst_case() {
        // 启发式不保证最优，但应明显优于最差排列
        let strategy = GeneticStrategy::new(RoutingConfig {
            seed: Some(1),
            ..Default::default()
        });
        let start = GeoPoint::new(48.85, 2.35);
        let stops: Vec<RouteStop> = (0..6)
            .map(|i| stop(48.85 + i as f64 * 0.02, 2.35))
            .collect();
        let order = strategy.optimize(start, &stops);
        let optimized = total_distance(start, &stops, &order);
        // 最差情况：来回横跳
        let worst = total_distance(start, &stops, &[5, 0, 4, 1, 3, 2]);
        assert!(optimized < worst);
    }

    #[test]
    fn test_priority_bias_in_fitness() {
        let start = GeoPoint::new(48.85, 2.35);
        let mut stops = vec![stop(48.86, 2.35), stop(48.87, 2.35), stop(48.88, 2.35)];
        stops[2].priority = 5;
        // 高优先级排前的排列适应度更高（距离相近时）
        let urgent_first = GeneticStrategy::fitness(start, &stops, &[2, 0, 1]);
        let urgent_last = GeneticStrategy::fitness(start, &stops, &[0, 1, 2]);
        assert!(urgent_first > urgent_last);
    }
}
